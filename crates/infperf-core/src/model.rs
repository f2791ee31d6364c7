//! The records that flow through the load orchestrator: `RequestSpec` in,
//! `LifecycleRecord` out, `StageRuntimeInfo` bracketing each stage.

use serde::{Deserialize, Serialize};

/// One request to send, produced by a dataset iterator. Immutable once
/// handed to the request queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestSpec {
    Completion {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_tokens: Option<u32>,
    },
    Chat {
        messages: Vec<ChatMessage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_tokens: Option<u32>,
    },
}

impl RequestSpec {
    /// Concatenated prompt text, used for token counting and circuit-breaker
    /// matching regardless of API shape.
    pub fn prompt_text(&self) -> String {
        match self {
            RequestSpec::Completion { prompt, .. } => prompt.clone(),
            RequestSpec::Chat { messages, .. } => {
                messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("")
            }
        }
    }

    pub fn max_tokens(&self) -> Option<u32> {
        match self {
            RequestSpec::Completion { max_tokens, .. } => *max_tokens,
            RequestSpec::Chat { max_tokens, .. } => *max_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// A `RequestSpec` paired with its dataset-assigned worker affinity, used
/// when sessions must stick to one worker (multi-turn chat).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetItem {
    pub spec: RequestSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_worker_id: Option<usize>,
}

/// `(stage_id, spec, scheduled_ts, adapter)` handed to the request queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledRequest {
    pub request_id: u64,
    pub stage_id: i64,
    pub spec: RequestSpec,
    pub scheduled_ts: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_worker_id: Option<usize>,
}

/// Per-call token accounting. Token counts are always derived from the
/// tokenizer over text actually received, never trusted from the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferenceInfo {
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// One timestamp per decoded SSE frame; empty for non-streaming calls.
    pub output_token_ts: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
}

/// The fatal-for-this-attempt error taxonomy: `network`, `timeout`,
/// `http_error`. Malformed SSE frames are not represented here — they are
/// a parse anomaly, not a request failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestError {
    pub kind: String,
    pub message: String,
}

/// One attempt, successful or not. Produced by the HTTP client adapter,
/// consumed by the lifecycle collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleRecord {
    pub request_id: u64,
    pub stage_id: i64,
    pub scheduled_ts: f64,
    pub start_ts: f64,
    pub end_ts: f64,
    pub request_payload: String,
    #[serde(default)]
    pub response_payload: String,
    pub info: InferenceInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RequestError>,
}

impl LifecycleRecord {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn request_latency(&self) -> f64 {
        self.end_ts - self.start_ts
    }

    pub fn schedule_error(&self) -> f64 {
        self.start_ts - self.scheduled_ts
    }

    /// `TTFT`: first streaming frame timestamp minus start timestamp.
    pub fn time_to_first_token(&self) -> Option<f64> {
        self.info.output_token_ts.first().map(|ts| ts - self.start_ts)
    }

    /// `ITL`: gaps between successive streaming frame timestamps.
    pub fn inter_token_latencies(&self) -> Vec<f64> {
        self.info.output_token_ts.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Mean inter-token gap across the whole decode, `None` when fewer than
    /// two frames were observed.
    pub fn time_per_output_token(&self) -> Option<f64> {
        let ts = &self.info.output_token_ts;
        if ts.len() < 2 {
            return None;
        }
        Some((ts[ts.len() - 1] - ts[0]) / (ts.len() - 1) as f64)
    }

    /// `NTPOT`: request latency divided by output token count; zero when no
    /// output tokens were produced.
    pub fn normalized_time_per_output_token(&self) -> f64 {
        if self.info.output_tokens == 0 {
            0.0
        } else {
            self.request_latency() / self.info.output_tokens as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
}

/// Wall-clock and status bracket for one stage, owned exclusively by the
/// stage orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRuntimeInfo {
    pub stage_id: i64,
    pub rate: f64,
    pub start_wallclock: jiff::Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_wallclock: Option<jiff::Timestamp>,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency_level: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_text_joins_chat_messages() {
        let spec = RequestSpec::Chat {
            messages: vec![
                ChatMessage { role: "user".into(), content: "hi ".into() },
                ChatMessage { role: "assistant".into(), content: "there".into() },
            ],
            max_tokens: None,
        };
        assert_eq!(spec.prompt_text(), "hi there");
    }

    #[test]
    fn ntpot_is_zero_with_no_output_tokens() {
        let record = LifecycleRecord {
            request_id: 0,
            stage_id: 0,
            scheduled_ts: 0.0,
            start_ts: 0.0,
            end_ts: 1.0,
            request_payload: String::new(),
            response_payload: String::new(),
            info: InferenceInfo::default(),
            error: None,
        };
        assert_eq!(record.normalized_time_per_output_token(), 0.0);
    }

    #[test]
    fn inter_token_latencies_are_adjacent_diffs() {
        let mut info = InferenceInfo::default();
        info.output_token_ts = vec![1.0, 1.2, 1.5];
        let record = LifecycleRecord {
            request_id: 0,
            stage_id: 0,
            scheduled_ts: 0.0,
            start_ts: 0.5,
            end_ts: 2.0,
            request_payload: String::new(),
            response_payload: String::new(),
            info,
            error: None,
        };
        let itl = record.inter_token_latencies();
        assert!((itl[0] - 0.2).abs() < 1e-9);
        assert!((itl[1] - 0.3).abs() < 1e-9);
        assert_eq!(record.time_to_first_token(), Some(0.5));
        assert!((record.time_per_output_token().unwrap() - 0.25).abs() < 1e-9);
    }
}
