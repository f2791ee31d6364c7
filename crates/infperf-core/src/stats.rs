//! Shared numeric helpers. Both the summarizer (C8) and the sweep planner's
//! saturation estimate (C9) reduce a bag of `f64` samples to percentiles;
//! this lives in `infperf-core` so neither crate depends on the other for
//! it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Linear-interpolation percentile over `sorted` (ascending, non-empty),
/// matching numpy's default `percentile` rather than a nearest-rank scheme.
/// `p` is a percentage in `0..=100`.
pub fn percentile_linear(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let frac = rank - lower as f64;
    sorted[lower] + frac * (sorted[upper] - sorted[lower])
}

/// A mean/min/max plus a configurable set of percentiles over one metric,
/// generalizing the classic "six-number summary" to whatever percentile
/// list the report config names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Keyed by `"p<value>"`, e.g. `"p50"`, `"p99.9"`.
    pub percentiles: BTreeMap<String, f64>,
}

/// Builds a `MetricSummary` from `samples`, or `None` if there are none to
/// summarize (e.g. no streaming records for `time_to_first_token`).
pub fn summarize(samples: &mut [f64], percentiles: &[f64]) -> Option<MetricSummary> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(f64::total_cmp);
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let mut pctl = BTreeMap::new();
    for &p in percentiles {
        pctl.insert(format!("p{p}"), percentile_linear(samples, p));
    }
    Some(MetricSummary { mean, min: samples[0], max: samples[samples.len() - 1], percentiles: pctl })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_linear_interpolates_between_ranks() {
        let sorted = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile_linear(&sorted, 0.0), 10.0);
        assert_eq!(percentile_linear(&sorted, 100.0), 50.0);
        assert!((percentile_linear(&sorted, 50.0) - 30.0).abs() < 1e-9);
        // rank = 0.25 * 4 = 1.0 -> exact index 1
        assert!((percentile_linear(&sorted, 25.0) - 20.0).abs() < 1e-9);
        // rank = 0.1 * 4 = 0.4 -> interpolated between index 0 and 1
        assert!((percentile_linear(&sorted, 10.0) - 14.0).abs() < 1e-9);
    }

    #[test]
    fn summarize_is_none_for_empty_samples() {
        assert!(summarize(&mut [], &[50.0]).is_none());
    }

    #[test]
    fn summarize_computes_mean_min_max() {
        let mut samples = vec![3.0, 1.0, 2.0];
        let summary = summarize(&mut samples, &[50.0]).unwrap();
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 3.0);
        assert!((summary.mean - 2.0).abs() < 1e-9);
        assert!((summary.percentiles["p50"] - 2.0).abs() < 1e-9);
    }
}
