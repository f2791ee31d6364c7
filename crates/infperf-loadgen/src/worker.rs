use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use infperf_client::HttpClientAdapter;
use infperf_core::clock;
use infperf_core::traits::Tokenizer;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::collector::LifecycleCollectorHandle;
use crate::queue::RequestQueue;
use crate::signals::RunSignals;

const QUEUE_POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Keeps the queue's join bookkeeping consistent no matter how the owning
/// task ends — normal completion, or an abort when the orchestrator cancels
/// a stage. Cancelled attempts never reach `collector.emit` — they're lost
/// intentionally — but the queue item must still be acknowledged or
/// `RequestQueue::join` would hang forever.
struct TaskGuard {
    queue: Arc<RequestQueue>,
    channel: usize,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.queue.task_done(self.channel);
    }
}

/// Marks one request `active` for the span between the end of its
/// scheduled-time sleep and the HTTP call finishing — per spec §4.3 step 2c,
/// the counter increments only once a request actually starts, not while it
/// is still picked-but-sleeping through the pre-roll.
struct ActiveGuard {
    active: Arc<AtomicU64>,
}

impl ActiveGuard {
    fn new(active: Arc<AtomicU64>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        ActiveGuard { active }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One cooperative worker (C3): a single-threaded event loop (here, a
/// tokio task) that waits for `request_phase`, pulls from its dedicated
/// queue channel under a concurrency-limiting semaphore, and spawns a
/// sub-task per request that sleeps until `scheduled_ts`, calls the HTTP
/// client adapter, and emits a `LifecycleRecord`.
pub async fn run_worker(
    worker_id: usize,
    queue: Arc<RequestQueue>,
    signals: RunSignals,
    client: Arc<HttpClientAdapter>,
    tokenizer: Arc<dyn Tokenizer>,
    collector: LifecycleCollectorHandle,
) {
    let mut phase_rx = signals.request_phase();
    let cancel_rx = signals.cancel_signal();
    let mut local_max_concurrency = signals.max_concurrency.load(Ordering::SeqCst);
    let mut semaphore = Arc::new(Semaphore::new(local_max_concurrency as usize));

    loop {
        if signals.is_stopped() {
            break;
        }
        if !*phase_rx.borrow() {
            if phase_rx.changed().await.is_err() {
                break;
            }
            continue;
        }

        // Stage boundary: stages fully drain before the next one starts, so
        // it's safe to resize here without draining live permits.
        let target_max_concurrency = signals.max_concurrency.load(Ordering::SeqCst);
        if target_max_concurrency != local_max_concurrency {
            local_max_concurrency = target_max_concurrency;
            semaphore = Arc::new(Semaphore::new(local_max_concurrency as usize));
        }

        let mut tasks = JoinSet::new();

        while *phase_rx.borrow() && !*cancel_rx.borrow() {
            let permit = match Arc::clone(&semaphore).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let queue_for_pull = Arc::clone(&queue);
            let item = tokio::task::spawn_blocking(move || queue_for_pull.get(worker_id, QUEUE_POLL_TIMEOUT))
                .await
                .unwrap_or(None);

            let Some(scheduled) = item else {
                drop(permit);
                continue;
            };

            let guard = TaskGuard { queue: Arc::clone(&queue), channel: worker_id };

            let client = Arc::clone(&client);
            let tokenizer = Arc::clone(&tokenizer);
            let collector = collector.clone();
            let finished = Arc::clone(&signals.finished_requests);
            let active = Arc::clone(&signals.active_requests);

            tasks.spawn(async move {
                let _permit = permit;
                let _guard = guard;

                let sleep_for = scheduled.scheduled_ts - clock::now();
                if sleep_for > 0.0 {
                    tokio::time::sleep(Duration::from_secs_f64(sleep_for)).await;
                } else {
                    tracing::debug!(
                        worker = worker_id,
                        miss_by_secs = -sleep_for,
                        "worker missed scheduled request time"
                    );
                }

                let _active = ActiveGuard::new(active);
                let record = client.process_request(tokenizer.as_ref(), &scheduled).await;
                finished.fetch_add(1, Ordering::SeqCst);
                collector.emit(record);
            });

            tokio::task::yield_now().await;
        }

        if *cancel_rx.borrow() {
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        } else {
            while tasks.join_next().await.is_some() {}
        }

        if signals.is_stopped() {
            break;
        }
    }

    tracing::debug!(worker = worker_id, "worker stopped");
}
