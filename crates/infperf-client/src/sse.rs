use infperf_core::model::RequestSpec;
use serde_json::Value;

/// Buffers raw response bytes and yields complete `\n\n`-delimited SSE
/// frames as they accumulate.
#[derive(Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pops the earliest complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.windows(2).position(|w| w == b"\n\n")?;
        let frame: Vec<u8> = self.buf.drain(..pos).collect();
        self.buf.drain(..2); // consume the delimiter itself
        Some(frame)
    }
}

#[derive(Clone, Copy)]
pub enum ApiKind {
    Completion,
    Chat,
}

pub fn api_kind(spec: &RequestSpec) -> ApiKind {
    match spec {
        RequestSpec::Completion { .. } => ApiKind::Completion,
        RequestSpec::Chat { .. } => ApiKind::Chat,
    }
}

#[derive(Debug, Default)]
pub struct FrameOutcome {
    /// Text delta extracted from this frame, empty if none.
    pub text: String,
    /// `true` once the `[DONE]` sentinel was observed.
    pub done: bool,
    /// `true` if a `data: ` line in this frame could not be parsed as JSON.
    /// Not a request-level failure on its own: the parser skips the line
    /// and keeps whatever was decoded.
    pub decode_error: bool,
}

/// Parses one complete SSE frame, extracting the text delta for `kind`.
/// Lines not starting with `data: ` are ignored; `data: [DONE]` ends the
/// stream without contributing text.
pub fn parse_frame(frame: &[u8], kind: ApiKind) -> FrameOutcome {
    let mut outcome = FrameOutcome::default();
    for line in frame.split(|b| *b == b'\n') {
        let line = trim_ascii(line);
        let Some(rest) = strip_data_prefix(line) else { continue };
        let rest = trim_ascii(rest);
        if rest == b"[DONE]" {
            outcome.done = true;
            break;
        }
        match serde_json::from_slice::<Value>(rest) {
            Ok(data) => {
                if let Some(delta) = extract_delta(&data, kind) {
                    outcome.text.push_str(&delta);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed SSE data line");
                outcome.decode_error = true;
            }
        }
    }
    outcome
}

fn strip_data_prefix(line: &[u8]) -> Option<&[u8]> {
    line.strip_prefix(b"data: ").or_else(|| line.strip_prefix(b"data:"))
}

fn trim_ascii(mut s: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = s {
        if first.is_ascii_whitespace() {
            s = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = s {
        if last.is_ascii_whitespace() {
            s = rest;
        } else {
            break;
        }
    }
    s
}

fn extract_delta(data: &Value, kind: ApiKind) -> Option<String> {
    let choices = data.get("choices")?.as_array()?;
    let choice = choices.first()?;
    match kind {
        ApiKind::Completion => choice.get("text")?.as_str().map(str::to_owned),
        ApiKind::Chat => choice.get("delta")?.get("content")?.as_str().map(str::to_owned),
    }
}

/// Extracts output text from a buffered (non-streaming) JSON response body.
pub fn extract_buffered_text(data: &Value, kind: ApiKind) -> String {
    let Some(choices) = data.get("choices").and_then(Value::as_array) else {
        return String::new();
    };
    match kind {
        ApiKind::Completion => choices
            .first()
            .and_then(|c| c.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        ApiKind::Chat => choices
            .iter()
            .filter_map(|c| c.get("message")?.get("content")?.as_str())
            .collect::<Vec<_>>()
            .join(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_buffer_yields_complete_frames_only() {
        let mut fb = FrameBuffer::default();
        fb.push(b"data: {\"a\":1}\n\n");
        let frame = fb.next_frame().unwrap();
        assert_eq!(frame, b"data: {\"a\":1}");
        assert!(fb.next_frame().is_none());

        fb.push(b"data: {\"b\":2}");
        assert!(fb.next_frame().is_none());
        fb.push(b"\n\n");
        assert_eq!(fb.next_frame().unwrap(), b"data: {\"b\":2}");
    }

    #[test]
    fn parses_completion_delta() {
        let frame = br#"data: {"choices":[{"text":"hel"}]}"#;
        let outcome = parse_frame(frame, ApiKind::Completion);
        assert_eq!(outcome.text, "hel");
        assert!(!outcome.done);
    }

    #[test]
    fn parses_chat_delta() {
        let frame = br#"data: {"choices":[{"delta":{"content":"hi"}}]}"#;
        let outcome = parse_frame(frame, ApiKind::Chat);
        assert_eq!(outcome.text, "hi");
    }

    #[test]
    fn recognizes_done_sentinel() {
        let outcome = parse_frame(b"data: [DONE]", ApiKind::Chat);
        assert!(outcome.done);
        assert!(outcome.text.is_empty());
    }

    #[test]
    fn malformed_json_is_a_parse_anomaly_not_a_failure() {
        let outcome = parse_frame(b"data: {not json", ApiKind::Chat);
        assert!(outcome.decode_error);
        assert!(outcome.text.is_empty());
    }
}
