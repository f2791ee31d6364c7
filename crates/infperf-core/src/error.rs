//! Crate-wide error kinds.
//!
//! Per-request failures (network, timeout, http_error) never surface as
//! `Error` — they are recorded on `LifecycleRecord::error` instead. This
//! enum carries only the fatal kinds: configuration problems discovered
//! before a run starts, and setup failures while wiring the orchestrator.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("setup error: {0}")]
    Setup(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
