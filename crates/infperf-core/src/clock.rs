//! Monotonic-clock helpers.
//!
//! All lifecycle timestamps (`scheduled_ts`, `start_ts`, `end_ts`,
//! `output_token_ts`) are `f64` seconds since a single in-process epoch
//! captured once at startup. Using `f64` seconds (rather than `Instant`
//! directly) keeps the data model `Copy`/`Serialize`-friendly and matches
//! the wire/report representation of every timestamp field.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Establishes the process-wide monotonic epoch. Idempotent: the first call
/// wins; later calls are no-ops. Call this once, early, in `main`.
pub fn init_epoch() {
    EPOCH.get_or_init(Instant::now);
}

/// Seconds elapsed since the process epoch, as an `f64`.
///
/// Panics if `init_epoch` was never called; every binary entry point and
/// every test that touches timestamps must call it first.
pub fn now() -> f64 {
    let epoch = EPOCH.get().expect("clock::init_epoch() was never called");
    epoch.elapsed().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_monotonically_nondecreasing() {
        init_epoch();
        let a = now();
        let b = now();
        assert!(b >= a);
    }
}
