use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use infperf_core::model::ScheduledRequest;

struct Channel {
    sender: crossbeam_channel::Sender<ScheduledRequest>,
    receiver: crossbeam_channel::Receiver<ScheduledRequest>,
    in_flight: Arc<(Mutex<usize>, Condvar)>,
}

/// A multi-channel queue of `n` independent joinable FIFOs. Requests that
/// need worker affinity (multi-turn sessions) are routed to
/// `preferred_worker_id % n`; everything else is spread round-robin across
/// all channels so no single worker starves the rest. The queue itself is
/// unbounded — backpressure comes from each worker's own semaphore.
pub struct RequestQueue {
    channels: Vec<Channel>,
    round_robin: std::sync::atomic::AtomicUsize,
}

impl RequestQueue {
    pub fn new(num_channels: usize) -> Self {
        let num_channels = num_channels.max(1);
        let channels = (0..num_channels)
            .map(|_| {
                let (sender, receiver) = crossbeam_channel::unbounded();
                Channel { sender, receiver, in_flight: Arc::new((Mutex::new(0), Condvar::new())) }
            })
            .collect();
        RequestQueue { channels, round_robin: std::sync::atomic::AtomicUsize::new(0) }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Channel index for a request, honoring `preferred_worker_id` affinity
    /// and otherwise spreading load round-robin.
    pub fn route(&self, preferred_worker_id: Option<usize>) -> usize {
        match preferred_worker_id {
            Some(id) => id % self.channels.len(),
            None => self.round_robin.fetch_add(1, std::sync::atomic::Ordering::Relaxed) % self.channels.len(),
        }
    }

    pub fn put(&self, item: ScheduledRequest, channel_id: usize) {
        let channel = &self.channels[channel_id % self.channels.len()];
        {
            let (lock, _) = &*channel.in_flight;
            *lock.lock().unwrap() += 1;
        }
        let _ = channel.sender.send(item);
    }

    /// Worker-side blocking pull with timeout; `None` on timeout or an
    /// empty/disconnected channel.
    pub fn get(&self, channel_id: usize, timeout: Duration) -> Option<ScheduledRequest> {
        let channel = &self.channels[channel_id % self.channels.len()];
        channel.receiver.recv_timeout(timeout).ok()
    }

    /// Acknowledges one item as fully processed, waking any `join` waiters
    /// once the channel empties.
    pub fn task_done(&self, channel_id: usize) {
        let channel = &self.channels[channel_id % self.channels.len()];
        let (lock, cvar) = &*channel.in_flight;
        let mut count = lock.lock().unwrap();
        *count = count.saturating_sub(1);
        if *count == 0 {
            cvar.notify_all();
        }
    }

    /// Discards pending items after cancellation, acknowledging each one so
    /// a concurrent `join` doesn't hang.
    pub fn drain(&self, channel_id: Option<usize>) {
        let targets = self.target_indices(channel_id);
        for idx in targets {
            let channel = &self.channels[idx];
            while channel.receiver.try_recv().is_ok() {
                self.task_done(idx);
            }
        }
    }

    /// Blocks until every delivered item on the targeted channel(s) has
    /// been acknowledged via `task_done`.
    pub fn join(&self, channel_id: Option<usize>) {
        let targets = self.target_indices(channel_id);
        for idx in targets {
            let channel = &self.channels[idx];
            let (lock, cvar) = &*channel.in_flight;
            let mut count = lock.lock().unwrap();
            while *count > 0 {
                count = cvar.wait(count).unwrap();
            }
        }
    }

    fn target_indices(&self, channel_id: Option<usize>) -> Vec<usize> {
        match channel_id {
            Some(id) => vec![id % self.channels.len()],
            None => (0..self.channels.len()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infperf_core::model::RequestSpec;

    fn item(request_id: u64) -> ScheduledRequest {
        ScheduledRequest {
            request_id,
            stage_id: 0,
            spec: RequestSpec::Completion { prompt: "hi".into(), max_tokens: None },
            scheduled_ts: 0.0,
            adapter: None,
            preferred_worker_id: None,
        }
    }

    #[test]
    fn round_trip_put_get_task_done() {
        let q = RequestQueue::new(2);
        q.put(item(1), 0);
        let got = q.get(0, Duration::from_millis(10)).unwrap();
        assert_eq!(got.request_id, 1);
        q.task_done(0);
        q.join(Some(0));
    }

    #[test]
    fn affinity_routes_to_preferred_worker() {
        let q = RequestQueue::new(4);
        assert_eq!(q.route(Some(5)), 1);
        assert_eq!(q.route(Some(4)), 0);
    }

    #[test]
    fn round_robin_spreads_without_affinity() {
        let q = RequestQueue::new(3);
        let routes: Vec<usize> = (0..6).map(|_| q.route(None)).collect();
        assert_eq!(routes, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn drain_acks_all_pending_items() {
        let q = RequestQueue::new(1);
        for i in 0..5 {
            q.put(item(i), 0);
        }
        q.drain(None);
        q.join(None); // must not hang
    }
}
