use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp};

use crate::Scheduler;

/// Emits `t[i+1] = t[i] + Exp(1/rate)`: Poisson-like micro-jitter on a
/// constant mean rate. This prevents synchronized bursts across workers
/// while keeping the long-run average at `rate` requests/sec.
pub struct ConstantScheduler {
    exp: Exp<f64>,
    rng: StdRng,
    ts: f64,
}

impl ConstantScheduler {
    pub fn new(rate: f64, seed: u64, initial: f64) -> Self {
        ConstantScheduler {
            exp: Exp::new(rate).expect("rate must be positive"),
            rng: StdRng::seed_from_u64(seed),
            ts: initial,
        }
    }
}

impl Scheduler for ConstantScheduler {
    fn next(&mut self) -> f64 {
        self.ts += self.exp.sample(&mut self.rng);
        self.ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_monotonically_increasing() {
        let mut s = ConstantScheduler::new(10.0, 42, 0.0);
        let mut prev = 0.0;
        for _ in 0..1000 {
            let t = s.next();
            assert!(t > prev);
            prev = t;
        }
    }

    #[test]
    fn same_seed_is_reproducible() {
        let mut a = ConstantScheduler::new(5.0, 7, 0.0);
        let mut b = ConstantScheduler::new(5.0, 7, 0.0);
        for _ in 0..100 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn converges_to_configured_rate() {
        let rate = 20.0;
        let mut s = ConstantScheduler::new(rate, 1, 0.0);
        let n = 20_000;
        let mut last = 0.0;
        for _ in 0..n {
            last = s.next();
        }
        let achieved = n as f64 / last;
        assert!((achieved - rate).abs() / rate < 0.05, "achieved={achieved} rate={rate}");
    }
}
