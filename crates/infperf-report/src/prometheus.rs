//! `PrometheusClient` reference implementation. Querying a real Prometheus
//! server (PromQL construction, HTTP scrape, managed auth) is out of scope;
//! this always returns an empty snapshot so the orchestrator's
//! metrics-scrape seam has something to call when no real client is wired
//! in.

use infperf_core::Result;
use infperf_core::traits::{PrometheusClient, ServerMetricsSnapshot};

#[derive(Debug, Default)]
pub struct NullPrometheusClient;

#[async_trait::async_trait]
impl PrometheusClient for NullPrometheusClient {
    async fn scrape(&self, _start_wallclock: jiff::Timestamp, _end_wallclock: jiff::Timestamp) -> Result<ServerMetricsSnapshot> {
        Ok(ServerMetricsSnapshot::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scrape_returns_empty_snapshot() {
        let client = NullPrometheusClient;
        let now = jiff::Timestamp::now();
        let snapshot = client.scrape(now, now).await.unwrap();
        assert!(snapshot.metrics.is_empty());
    }
}
