//! Request-time schedulers (C1 of the load orchestrator).
//!
//! A `Scheduler` maps stage configuration to an infinite (or trace-bounded)
//! sequence of absolute monotonic timestamps. `next()` is pure — it depends
//! only on the scheduler's seed and prior state, never sleeps, and never
//! touches a clock. Sleeping until the returned timestamp is the worker's
//! job.

mod constant;
mod poisson;
mod trace;

pub use constant::ConstantScheduler;
pub use poisson::PoissonScheduler;
pub use trace::{TraceEntry, TraceReplayScheduler, read_trace_file};

/// Emits the absolute timestamp of the Nth request for the current stage.
/// Not threadsafe — each stage owns its own instance.
pub trait Scheduler: Send {
    fn next(&mut self) -> f64;
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error reading trace file: {0}")]
    Io(#[from] std::io::Error),
    #[error("trace file {0} has no entries")]
    EmptyTrace(String),
}
