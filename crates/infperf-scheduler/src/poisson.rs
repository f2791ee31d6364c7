use std::collections::VecDeque;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp, Poisson};

use crate::Scheduler;

/// For each one-second window, draws `k ~ Poisson(rate)`. If `k = 0`,
/// advances the timestamp by one second; otherwise nests a constant-rate(k)
/// schedule over that second, queuing `k` sub-second timestamps and
/// draining them one at a time.
pub struct PoissonScheduler {
    rate: f64,
    rng: StdRng,
    ts: f64,
    pending: VecDeque<f64>,
}

impl PoissonScheduler {
    pub fn new(rate: f64, seed: u64, initial: f64) -> Self {
        PoissonScheduler { rate, rng: StdRng::seed_from_u64(seed), ts: initial, pending: VecDeque::new() }
    }

    fn fill_next_second(&mut self) {
        let poisson = Poisson::new(self.rate).expect("rate must be positive");
        let k = poisson.sample(&mut self.rng).round() as u64;
        if k == 0 {
            self.ts += 1.0;
            self.pending.push_back(self.ts);
            return;
        }
        let exp = Exp::new(k as f64).expect("k must be positive");
        let mut t = self.ts;
        for _ in 0..k {
            t += exp.sample(&mut self.rng);
            self.pending.push_back(t);
        }
        self.ts = t;
    }
}

impl Scheduler for PoissonScheduler {
    fn next(&mut self) -> f64 {
        if self.pending.is_empty() {
            self.fill_next_second();
        }
        self.pending.pop_front().expect("fill_next_second always queues at least one timestamp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_monotonically_nondecreasing() {
        let mut s = PoissonScheduler::new(8.0, 3, 0.0);
        let mut prev = 0.0;
        for _ in 0..5000 {
            let t = s.next();
            assert!(t >= prev);
            prev = t;
        }
    }

    #[test]
    fn converges_to_configured_rate() {
        let rate = 15.0;
        let mut s = PoissonScheduler::new(rate, 9, 0.0);
        let n = 30_000;
        let mut last = 0.0;
        for _ in 0..n {
            last = s.next();
        }
        let achieved = n as f64 / last;
        assert!((achieved - rate).abs() / rate < 0.1, "achieved={achieved} rate={rate}");
    }
}
