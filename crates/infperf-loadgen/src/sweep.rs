//! Sweep planner (C9): an optional pre-stage that bursts load against the
//! server, samples `active_requests_counter`, and derives an N-stage rate
//! plan from the observed drain rate. The burst itself is executed by the
//! orchestrator, which reuses the same stage-execution path as any other
//! stage — this module only holds the planning math.

use infperf_core::config::{LoadStage, StageGenType, SweepConfig};
use infperf_core::stats::percentile_linear;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("sweep stage produced fewer than 2 drain-rate samples; cannot estimate saturation")]
    InsufficientSamples,
}

/// Estimates the server's saturation point from `(elapsed_secs,
/// active_requests)` samples taken during the sweep burst. Samples at or
/// after `timeout` are dropped first; instantaneous drain rates
/// `|Δactive / Δt|` are computed over adjacent samples where the active
/// count fell, and `saturation_percentile` of those rates is returned.
pub fn compute_saturation(samples: &[(f64, u64)], timeout: f64, saturation_percentile: f64) -> Result<f64, Error> {
    let kept: Vec<&(f64, u64)> = samples.iter().filter(|(t, _)| *t < timeout).collect();
    let mut drain_rates = Vec::new();
    for w in kept.windows(2) {
        let (t0, a0) = *w[0];
        let (t1, a1) = *w[1];
        let dt = t1 - t0;
        let delta = a1 as i64 - a0 as i64;
        if delta < 0 && dt > 0.0 {
            drain_rates.push((-delta) as f64 / dt);
        }
    }
    if drain_rates.len() < 2 {
        return Err(Error::InsufficientSamples);
    }
    drain_rates.sort_by(f64::total_cmp);
    Ok(percentile_linear(&drain_rates, saturation_percentile))
}

/// Builds the final `num_stages`-stage rate plan between 1 and `saturation`,
/// geometric or linear per `sweep.type`. Each stage runs for
/// `sweep.stage_duration` seconds.
pub fn plan_stages(saturation: f64, sweep: &SweepConfig) -> Vec<LoadStage> {
    let n = sweep.num_stages.max(1);
    let saturation = saturation.max(1.0);
    (0..n)
        .map(|i| {
            let rate = if n == 1 {
                saturation
            } else {
                match sweep.gen_type {
                    StageGenType::Linear => 1.0 + (saturation - 1.0) * i as f64 / (n - 1) as f64,
                    StageGenType::Geometric => {
                        let ratio = saturation.powf(1.0 / (n - 1) as f64);
                        ratio.powi(i as i32)
                    }
                }
            };
            LoadStage { rate: Some(rate), duration: Some(sweep.stage_duration), num_requests: None, concurrency_level: None }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep_config(gen_type: StageGenType, num_stages: u32) -> SweepConfig {
        SweepConfig { gen_type, num_requests: 2000, timeout: 60.0, num_stages, stage_duration: 180, saturation_percentile: 95.0 }
    }

    #[test]
    fn requires_at_least_two_drain_samples() {
        let samples = vec![(0.0, 10)];
        assert!(matches!(compute_saturation(&samples, 10.0, 95.0), Err(Error::InsufficientSamples)));
    }

    #[test]
    fn samples_at_or_after_timeout_are_excluded() {
        let samples = vec![(0.0, 10), (1.0, 5), (20.0, 0)];
        // only the first drain (10->5) falls before timeout=2.0
        assert!(matches!(compute_saturation(&samples, 2.0, 95.0), Err(Error::InsufficientSamples)));
    }

    #[test]
    fn computes_percentile_of_drain_rates() {
        let samples = vec![(0.0, 10), (1.0, 20), (2.0, 5), (3.0, 0)];
        let saturation = compute_saturation(&samples, 10.0, 50.0).unwrap();
        assert!(saturation > 0.0);
    }

    #[test]
    fn linear_plan_spans_one_to_saturation() {
        let sweep = sweep_config(StageGenType::Linear, 5);
        let stages = plan_stages(20.0, &sweep);
        assert_eq!(stages.len(), 5);
        assert!((stages[0].rate.unwrap() - 1.0).abs() < 1e-9);
        assert!((stages[4].rate.unwrap() - 20.0).abs() < 1e-9);
        assert!(stages.iter().all(|s| s.duration == Some(180)));
    }

    #[test]
    fn geometric_plan_spans_one_to_saturation() {
        let sweep = sweep_config(StageGenType::Geometric, 4);
        let stages = plan_stages(8.0, &sweep);
        assert!((stages[0].rate.unwrap() - 1.0).abs() < 1e-9);
        assert!((stages[3].rate.unwrap() - 8.0).abs() < 1e-6);
    }

    #[test]
    fn single_stage_plan_uses_saturation_directly() {
        let sweep = sweep_config(StageGenType::Linear, 1);
        let stages = plan_stages(12.0, &sweep);
        assert_eq!(stages.len(), 1);
        assert!((stages[0].rate.unwrap() - 12.0).abs() < 1e-9);
    }
}
