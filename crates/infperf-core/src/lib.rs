//! Shared data model, config, and collaborator traits for the inference
//! benchmarking harness.
//!
//! This crate has no opinion on *how* load is generated or reported; it only
//! defines the records that flow between the scheduler, worker pool, HTTP
//! client, circuit breakers, and summarizer, plus the traits external
//! collaborators (dataset producers, tokenizers, report sinks, Prometheus
//! clients) must implement.

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod stats;
pub mod traits;

pub use error::{Error, Result};
