use futures::StreamExt;
use infperf_core::clock;
use infperf_core::model::{InferenceInfo, LifecycleRecord, RequestError, ScheduledRequest};
use infperf_core::traits::Tokenizer;

use crate::payload::{ClientConfig, build_payload, route};
use crate::sse::{self, FrameBuffer};
use crate::Error;

/// One HTTP client session per worker process: a single `reqwest::Client`
/// whose connection pool is capped at
/// `worker_max_tcp_connections`.
pub struct HttpClientAdapter {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpClientAdapter {
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let mut builder =
            reqwest::Client::builder().pool_max_idle_per_host(config.worker_max_tcp_connections);
        if let Some(timeout) = config.request_timeout {
            // Belt-and-suspenders: reqwest's own timeout plus our explicit
            // tokio::time::timeout below, so a hang anywhere in the
            // transport still produces a `timeout` LifecycleRecord.
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(HttpClientAdapter { client, config })
    }

    /// Issues one call and always produces a `LifecycleRecord`; a worker
    /// task never lets an HTTP error escape as an exception.
    pub async fn process_request(&self, tokenizer: &dyn Tokenizer, req: &ScheduledRequest) -> LifecycleRecord {
        let payload = build_payload(&req.spec, &self.config);
        let request_payload = payload.to_string();
        let url = format!("{}{}", self.config.base_url, route(&req.spec));
        let kind = sse::api_kind(&req.spec);
        let input_tokens = tokenizer.count_tokens(&req.spec.prompt_text());

        let start_ts = clock::now();

        let mut builder = self.client.post(&url).json(&payload);
        if let Some(token) = &self.config.api_key {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in &self.config.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let send_fut = builder.send();
        let sent = match self.config.request_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, send_fut).await {
                Ok(result) => result,
                Err(_) => {
                    let end_ts = clock::now();
                    return LifecycleRecord {
                        request_id: req.request_id,
                        stage_id: req.stage_id,
                        scheduled_ts: req.scheduled_ts,
                        start_ts,
                        end_ts,
                        request_payload,
                        response_payload: String::new(),
                        info: InferenceInfo { input_tokens, adapter: req.adapter.clone(), ..Default::default() },
                        error: Some(RequestError {
                            kind: "timeout".into(),
                            message: format!("request exceeded {timeout:?} timeout"),
                        }),
                    };
                }
            },
            None => send_fut.await,
        };

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                let end_ts = clock::now();
                return LifecycleRecord {
                    request_id: req.request_id,
                    stage_id: req.stage_id,
                    scheduled_ts: req.scheduled_ts,
                    start_ts,
                    end_ts,
                    request_payload,
                    response_payload: String::new(),
                    info: InferenceInfo { input_tokens, adapter: req.adapter.clone(), ..Default::default() },
                    error: Some(classify_send_error(&e)),
                };
            }
        };

        let status = response.status();
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            let end_ts = clock::now();
            return LifecycleRecord {
                request_id: req.request_id,
                stage_id: req.stage_id,
                scheduled_ts: req.scheduled_ts,
                start_ts,
                end_ts,
                request_payload,
                response_payload: body.clone(),
                info: InferenceInfo { input_tokens, adapter: req.adapter.clone(), ..Default::default() },
                error: Some(RequestError {
                    kind: format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or("unknown")),
                    message: body,
                }),
            };
        }

        if self.config.streaming {
            self.consume_stream(response, kind, tokenizer, req, start_ts, request_payload, input_tokens).await
        } else {
            self.consume_buffered(response, kind, tokenizer, req, start_ts, request_payload, input_tokens).await
        }
    }

    async fn consume_stream(
        &self,
        response: reqwest::Response,
        kind: sse::ApiKind,
        tokenizer: &dyn Tokenizer,
        req: &ScheduledRequest,
        start_ts: f64,
        request_payload: String,
        input_tokens: u32,
    ) -> LifecycleRecord {
        let mut stream = response.bytes_stream();
        let mut frames = FrameBuffer::default();
        let mut raw = Vec::new();
        let mut output_text = String::new();
        let mut output_token_ts = Vec::new();

        'outer: while let Some(chunk) = stream.next().await {
            let Ok(chunk) = chunk else { break };
            raw.extend_from_slice(&chunk);
            frames.push(&chunk);
            while let Some(frame) = frames.next_frame() {
                output_token_ts.push(clock::now());
                let outcome = sse::parse_frame(&frame, kind);
                output_text.push_str(&outcome.text);
                if outcome.done {
                    break 'outer;
                }
            }
        }

        let end_ts = clock::now();
        let output_tokens = tokenizer.count_tokens(&output_text);
        LifecycleRecord {
            request_id: req.request_id,
            stage_id: req.stage_id,
            scheduled_ts: req.scheduled_ts,
            start_ts,
            end_ts,
            request_payload,
            response_payload: String::from_utf8_lossy(&raw).into_owned(),
            info: InferenceInfo { input_tokens, output_tokens, output_token_ts, adapter: req.adapter.clone() },
            error: None,
        }
    }

    async fn consume_buffered(
        &self,
        response: reqwest::Response,
        kind: sse::ApiKind,
        tokenizer: &dyn Tokenizer,
        req: &ScheduledRequest,
        start_ts: f64,
        request_payload: String,
        input_tokens: u32,
    ) -> LifecycleRecord {
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                let end_ts = clock::now();
                return LifecycleRecord {
                    request_id: req.request_id,
                    stage_id: req.stage_id,
                    scheduled_ts: req.scheduled_ts,
                    start_ts,
                    end_ts,
                    request_payload,
                    response_payload: String::new(),
                    info: InferenceInfo { input_tokens, adapter: req.adapter.clone(), ..Default::default() },
                    error: Some(RequestError { kind: "network".into(), message: e.to_string() }),
                };
            }
        };
        let end_ts = clock::now();
        let output_text = serde_json::from_str::<serde_json::Value>(&body)
            .map(|v| sse::extract_buffered_text(&v, kind))
            .unwrap_or_default();
        let output_tokens = tokenizer.count_tokens(&output_text);
        LifecycleRecord {
            request_id: req.request_id,
            stage_id: req.stage_id,
            scheduled_ts: req.scheduled_ts,
            start_ts,
            end_ts,
            request_payload,
            response_payload: body,
            info: InferenceInfo { input_tokens, output_tokens, output_token_ts: Vec::new(), adapter: req.adapter.clone() },
            error: None,
        }
    }
}

fn classify_send_error(e: &reqwest::Error) -> RequestError {
    if e.is_timeout() {
        RequestError { kind: "timeout".into(), message: e.to_string() }
    } else {
        RequestError { kind: "network".into(), message: e.to_string() }
    }
}
