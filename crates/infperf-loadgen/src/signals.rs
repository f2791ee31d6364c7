use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tokio::sync::watch;

/// The shared mutable state a run's workers and orchestrator coordinate
/// through: atomic counters plus single-writer/multi-reader boolean events.
/// `watch` channels give readers
/// both "what's the current value" and "wait for it to change" for free,
/// which is exactly the `request_phase`/`cancel_signal` access pattern the
/// worker loop needs.
#[derive(Clone)]
pub struct RunSignals {
    request_phase: watch::Sender<bool>,
    cancel_signal: watch::Sender<bool>,
    stop_signal: watch::Sender<bool>,
    pub finished_requests: Arc<AtomicU64>,
    pub active_requests: Arc<AtomicU64>,
    pub max_concurrency: Arc<AtomicU32>,
}

impl RunSignals {
    pub fn new(initial_max_concurrency: u32) -> Self {
        let (request_phase, _) = watch::channel(false);
        let (cancel_signal, _) = watch::channel(false);
        let (stop_signal, _) = watch::channel(false);
        RunSignals {
            request_phase,
            cancel_signal,
            stop_signal,
            finished_requests: Arc::new(AtomicU64::new(0)),
            active_requests: Arc::new(AtomicU64::new(0)),
            max_concurrency: Arc::new(AtomicU32::new(initial_max_concurrency)),
        }
    }

    pub fn set_request_phase(&self, value: bool) {
        let _ = self.request_phase.send(value);
    }

    pub fn request_phase(&self) -> watch::Receiver<bool> {
        self.request_phase.subscribe()
    }

    pub fn set_cancel_signal(&self, value: bool) {
        let _ = self.cancel_signal.send(value);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_signal.borrow()
    }

    pub fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.cancel_signal.subscribe()
    }

    pub fn set_stop_signal(&self, value: bool) {
        let _ = self.stop_signal.send(value);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_signal.borrow()
    }

    pub fn reset_finished_counter(&self) {
        self.finished_requests.store(0, Ordering::SeqCst);
    }

    pub fn finished_count(&self) -> u64 {
        self.finished_requests.load(Ordering::SeqCst)
    }

    pub fn active_count(&self) -> u64 {
        self.active_requests.load(Ordering::SeqCst)
    }
}
