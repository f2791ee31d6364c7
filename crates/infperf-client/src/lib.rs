//! Streaming HTTP client adapter (C4): builds the OpenAI-compatible request
//! payload, streams or buffers the response, parses SSE token deltas, and
//! produces a `LifecycleRecord`.

mod payload;
mod session;
mod sse;

pub use payload::ClientConfig;
pub use session::HttpClientAdapter;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("http request build failed: {0}")]
    Build(#[from] reqwest::Error),
}
