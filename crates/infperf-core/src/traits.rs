//! Interfaces for the external collaborators this crate does not itself
//! implement: dataset producers, the tokenizer, report sinks, and the
//! Prometheus client. The orchestrator depends only on these traits;
//! `infperf-report` ships minimal reference implementations so the crate
//! runs end to end.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::Result;
use crate::model::DatasetItem;

/// Yields `RequestSpec` values (wrapped in `DatasetItem` for optional worker
/// affinity). Implementations are free to be infinite (cycling) or bounded;
/// a bounded source is authoritative for stage request counts when a stage
/// is trace-backed.
pub trait DatasetSource: Send {
    /// Pulls the next item, or `None` if the dataset is exhausted.
    fn next_item(&mut self) -> Option<DatasetItem>;

    /// Total number of items this source will ever yield, if known in
    /// advance (e.g. trace-replay datasets). `None` for cycling/infinite
    /// sources.
    fn count(&self) -> Option<usize> {
        None
    }
}

/// Maps strings to token counts. A real implementation wraps a tokenizer
/// library; this crate only depends on the vocabulary-size-agnostic
/// counting interface.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> u32;
}

/// Accepts named JSON blobs for persistence (local file, object storage,
/// ...). One call per report file the run produces.
pub trait ReportSink: Send + Sync {
    fn write(&self, name: &str, value: &Value) -> Result<()>;
}

/// Server-side counters/histograms summarized from a Prometheus scrape,
/// keyed by metric name.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ServerMetricsSnapshot {
    pub metrics: BTreeMap<String, f64>,
}

/// Queries server-side Prometheus metrics over a time window. The PromQL
/// query builder and HTTP scrape are out of scope; this trait is the seam
/// a real client plugs into.
#[async_trait::async_trait]
pub trait PrometheusClient: Send + Sync {
    async fn scrape(&self, start_wallclock: jiff::Timestamp, end_wallclock: jiff::Timestamp) -> Result<ServerMetricsSnapshot>;
}
