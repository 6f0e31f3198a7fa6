//! OpenAI SSE stream adapter
//!
//! Parses the chat completions streaming format:
//! ```text
//! data: {"id":"chatcmpl-xxx","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"token"},"finish_reason":null}]}
//!
//! data: [DONE]
//! ```

use crate::stream_adapter::{ParsedChunk, StreamAdapter};
use serde::Deserialize;
use tracing::debug;

/// OpenAI-compatible SSE stream adapter
#[derive(Debug, Clone, Default)]
pub struct OpenAiAdapter;

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self
    }

    fn parse_data(&self, json_str: &str) -> ParsedChunk {
        let chunk = match serde_json::from_str::<OpenAiChunk>(json_str) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, "Unparseable stream event");
                return ParsedChunk::Error(format!("failed to parse chunk: {}", e));
            }
        };

        let Some(choice) = chunk.choices.into_iter().next() else {
            return ParsedChunk::Empty;
        };

        // A final chunk may carry content alongside the finish reason
        match (choice.delta.content, choice.finish_reason) {
            (Some(content), _) if !content.is_empty() => ParsedChunk::Content(content),
            (_, Some(reason)) => ParsedChunk::done(Some(reason)),
            _ => ParsedChunk::Empty,
        }
    }
}

impl StreamAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn parse(&self, event: &str) -> Vec<ParsedChunk> {
        event
            .lines()
            .map(str::trim)
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim)
            .filter(|data| !data.is_empty())
            .map(|data| {
                if data == "[DONE]" {
                    ParsedChunk::done(None)
                } else {
                    self.parse_data(data)
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAiDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_chunk() {
        let adapter = OpenAiAdapter::new();
        let data = r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#;

        let chunks = adapter.parse(data);
        assert_eq!(chunks, vec![ParsedChunk::content("Hello")]);
    }

    #[test]
    fn test_parse_finish_chunk() {
        let adapter = OpenAiAdapter::new();
        let data = r#"data: {"id":"chatcmpl-123","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;

        let chunks = adapter.parse(data);
        assert_eq!(chunks, vec![ParsedChunk::done(Some("stop".to_string()))]);
    }

    #[test]
    fn test_role_preamble_is_empty() {
        let adapter = OpenAiAdapter::new();
        let data = r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#;

        assert_eq!(adapter.parse(data), vec![ParsedChunk::Empty]);
    }

    #[test]
    fn test_done_marker_and_garbage() {
        let adapter = OpenAiAdapter::new();

        assert!(adapter.parse("data: [DONE]")[0].is_done());
        assert!(matches!(adapter.parse("data: {not json")[0], ParsedChunk::Error(_)));
        assert!(adapter.parse(": keep-alive").is_empty());
    }
}
