use std::collections::VecDeque;

use infperf_core::config::TriggerSpec;

/// One pattern-match outcome fed to every trigger of a breaker.
#[derive(Debug, Clone, Copy)]
pub struct HitSample {
    pub ts: jiff::Timestamp,
    pub hit: bool,
}

/// A trigger watches a stream of `HitSample`s and latches `fired()` once its
/// condition is met. Latching (rather than re-evaluating) matches the
/// original `Consecutive`/`RateOverWindow` semantics: once fired, a trigger
/// stays fired until `reset()`.
pub trait Trigger: Send {
    fn update(&mut self, sample: HitSample);
    fn fired(&self) -> bool;
    fn reset(&mut self);
}

pub fn build_trigger(spec: &TriggerSpec) -> Box<dyn Trigger> {
    match spec {
        TriggerSpec::Consecutive { threshold } => Box::new(Consecutive::new(*threshold)),
        TriggerSpec::RateOverWindow { window_sec, threshold, min_samples } => {
            Box::new(RateOverWindow::new(*window_sec, *threshold, *min_samples))
        }
    }
}

/// Fires once `threshold` consecutive hits are observed; any miss resets
/// the streak to zero.
pub struct Consecutive {
    threshold: u32,
    streak: u32,
    fired: bool,
}

impl Consecutive {
    pub fn new(threshold: u32) -> Self {
        Consecutive { threshold, streak: 0, fired: false }
    }
}

impl Trigger for Consecutive {
    fn update(&mut self, sample: HitSample) {
        self.streak = if sample.hit { self.streak + 1 } else { 0 };
        if self.streak >= self.threshold {
            self.fired = true;
        }
    }

    fn fired(&self) -> bool {
        self.fired
    }

    fn reset(&mut self) {
        self.streak = 0;
        self.fired = false;
    }
}

/// Fires once the hit rate over a sliding time window crosses `threshold`,
/// provided at least `min_samples` samples fall within the window.
pub struct RateOverWindow {
    window_sec: f64,
    threshold: f64,
    min_samples: u32,
    buf: VecDeque<HitSample>,
    fired: bool,
}

impl RateOverWindow {
    pub fn new(window_sec: f64, threshold: f64, min_samples: u32) -> Self {
        RateOverWindow { window_sec, threshold, min_samples, buf: VecDeque::new(), fired: false }
    }
}

impl Trigger for RateOverWindow {
    fn update(&mut self, sample: HitSample) {
        self.buf.push_back(sample);
        let cutoff = sample.ts - jiff::SignedDuration::from_secs_f64(self.window_sec);
        while let Some(front) = self.buf.front() {
            if front.ts < cutoff {
                self.buf.pop_front();
            } else {
                break;
            }
        }
        let total = self.buf.len() as u32;
        if total >= self.min_samples && total > 0 {
            let hits = self.buf.iter().filter(|s| s.hit).count() as f64;
            let rate = hits / total as f64;
            if rate >= self.threshold {
                self.fired = true;
            }
        }
    }

    fn fired(&self) -> bool {
        self.fired
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.fired = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(hit: bool) -> HitSample {
        HitSample { ts: jiff::Timestamp::now(), hit }
    }

    #[test]
    fn consecutive_fires_exactly_at_threshold() {
        let mut t = Consecutive::new(3);
        t.update(sample(true));
        assert!(!t.fired());
        t.update(sample(true));
        assert!(!t.fired());
        t.update(sample(true));
        assert!(t.fired());
    }

    #[test]
    fn consecutive_resets_streak_on_miss() {
        let mut t = Consecutive::new(2);
        t.update(sample(true));
        t.update(sample(false));
        t.update(sample(true));
        assert!(!t.fired());
    }

    #[test]
    fn rate_over_window_requires_min_samples() {
        let mut t = RateOverWindow::new(1000.0, 0.5, 5);
        for _ in 0..4 {
            t.update(sample(true));
        }
        assert!(!t.fired());
        t.update(sample(true));
        assert!(t.fired());
    }

    #[test]
    fn rate_over_window_respects_threshold() {
        let mut t = RateOverWindow::new(1000.0, 0.9, 2);
        t.update(sample(true));
        t.update(sample(false));
        assert!(!t.fired());
    }
}
