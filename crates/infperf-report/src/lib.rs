//! Summarizer (C8) and the reference `DatasetSource`/`Tokenizer`/
//! `ReportSink`/`PrometheusClient` collaborators a runnable binary needs
//! even though real datasets, tokenizers, and metrics backends are out of
//! scope.

pub mod mock;
pub mod prometheus;
pub mod sink;
pub mod summary;

pub use summary::{Report, build_report};
