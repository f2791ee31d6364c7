use infperf_core::model::RequestSpec;
use serde_json::{Value, json};

/// Per-run settings shared by every worker's HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub model_name: String,
    pub default_max_tokens: u32,
    pub ignore_eos: bool,
    pub streaming: bool,
    pub api_key: Option<String>,
    pub headers: Vec<(String, String)>,
    pub request_timeout: Option<std::time::Duration>,
    pub worker_max_tcp_connections: usize,
}

pub fn route(spec: &RequestSpec) -> &'static str {
    match spec {
        RequestSpec::Completion { .. } => "/v1/completions",
        RequestSpec::Chat { .. } => "/v1/chat/completions",
    }
}

/// Builds the JSON request body for `spec`, matching
/// `CompletionAPIData.to_payload` / `ChatCompletionAPIData.to_payload`: a
/// request-level `max_tokens` of zero/unset falls back to the configured
/// default.
pub fn build_payload(spec: &RequestSpec, config: &ClientConfig) -> Value {
    let max_tokens = spec.max_tokens().filter(|n| *n != 0).unwrap_or(config.default_max_tokens);
    match spec {
        RequestSpec::Completion { prompt, .. } => json!({
            "model": config.model_name,
            "prompt": prompt,
            "max_tokens": max_tokens,
            "ignore_eos": config.ignore_eos,
            "stream": config.streaming,
        }),
        RequestSpec::Chat { messages, .. } => {
            let messages: Vec<Value> =
                messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect();
            json!({
                "model": config.model_name,
                "messages": messages,
                "max_tokens": max_tokens,
                "ignore_eos": config.ignore_eos,
                "stream": config.streaming,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infperf_core::model::ChatMessage;

    fn config() -> ClientConfig {
        ClientConfig {
            base_url: "http://localhost:8000".into(),
            model_name: "test-model".into(),
            default_max_tokens: 128,
            ignore_eos: true,
            streaming: false,
            api_key: None,
            headers: vec![],
            request_timeout: None,
            worker_max_tcp_connections: 100,
        }
    }

    #[test]
    fn completion_route_and_payload() {
        let spec = RequestSpec::Completion { prompt: "hi".into(), max_tokens: None };
        assert_eq!(route(&spec), "/v1/completions");
        let payload = build_payload(&spec, &config());
        assert_eq!(payload["prompt"], "hi");
        assert_eq!(payload["max_tokens"], 128);
        assert_eq!(payload["ignore_eos"], true);
    }

    #[test]
    fn chat_route_and_payload_honors_explicit_max_tokens() {
        let spec = RequestSpec::Chat {
            messages: vec![ChatMessage { role: "user".into(), content: "hi".into() }],
            max_tokens: Some(64),
        };
        assert_eq!(route(&spec), "/v1/chat/completions");
        let payload = build_payload(&spec, &config());
        assert_eq!(payload["max_tokens"], 64);
        assert_eq!(payload["messages"][0]["role"], "user");
    }
}
