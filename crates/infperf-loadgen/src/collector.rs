use std::sync::{Arc, Mutex};

use infperf_breaker::CircuitBreakerLayer;
use infperf_core::model::LifecycleRecord;
use tokio::sync::mpsc;

/// The lifecycle collector (C5): a multi-producer, single-consumer channel
/// of records plus a consumer task that appends to the in-memory vector the
/// summarizer later reads and feeds every registered circuit breaker.
/// Every record a worker produces is either delivered here or the run is
/// aborted — there is no sampling or drop policy.
pub struct LifecycleCollector {
    sender: mpsc::UnboundedSender<Option<LifecycleRecord>>,
}

impl LifecycleCollector {
    /// Spawns the consumer task and returns a handle plus the shared record
    /// vector it appends to.
    pub fn spawn(breakers: Arc<Mutex<CircuitBreakerLayer>>) -> (Self, Arc<Mutex<Vec<LifecycleRecord>>>, tokio::task::JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Option<LifecycleRecord>>();
        let records = Arc::new(Mutex::new(Vec::new()));
        let records_for_task = Arc::clone(&records);

        let handle = tokio::spawn(async move {
            while let Some(item) = receiver.recv().await {
                match item {
                    Some(record) => {
                        breakers.lock().unwrap().feed_all(&record);
                        records_for_task.lock().unwrap().push(record);
                    }
                    None => break,
                }
            }
        });

        (LifecycleCollector { sender }, records, handle)
    }

    pub fn emit(&self, record: LifecycleRecord) {
        let _ = self.sender.send(Some(record));
    }

    /// Flushes and stops the consumer task.
    pub fn close(&self) {
        let _ = self.sender.send(None);
    }

    pub fn handle(&self) -> LifecycleCollectorHandle {
        LifecycleCollectorHandle { sender: self.sender.clone() }
    }
}

/// A cheaply-cloneable producer handle given to each worker.
#[derive(Clone)]
pub struct LifecycleCollectorHandle {
    sender: mpsc::UnboundedSender<Option<LifecycleRecord>>,
}

impl LifecycleCollectorHandle {
    pub fn emit(&self, record: LifecycleRecord) {
        let _ = self.sender.send(Some(record));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infperf_core::model::InferenceInfo;

    fn record(id: u64) -> LifecycleRecord {
        LifecycleRecord {
            request_id: id,
            stage_id: 0,
            scheduled_ts: 0.0,
            start_ts: 0.0,
            end_ts: 0.1,
            request_payload: String::new(),
            response_payload: String::new(),
            info: InferenceInfo::default(),
            error: None,
        }
    }

    #[tokio::test]
    async fn every_emitted_record_is_collected() {
        let breakers = Arc::new(Mutex::new(CircuitBreakerLayer::default()));
        let (collector, records, handle) = LifecycleCollector::spawn(breakers);
        for i in 0..10 {
            collector.emit(record(i));
        }
        collector.close();
        handle.await.unwrap();
        assert_eq!(records.lock().unwrap().len(), 10);
    }
}
