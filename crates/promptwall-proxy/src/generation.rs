//! Generation oracles
//!
//! `/chat` forwards the sanitized prompt to one of these and streams the
//! fragments back as they arrive.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use promptwall_core::{Error, EventBuffer, OpenAiAdapter, ParsedChunk, Result, StreamAdapter};
use serde::Serialize;
use tracing::{debug, warn};

/// Lazily produced text fragments
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Produces a completion for an already-sanitized prompt
#[async_trait]
pub trait GenerationOracle: Send + Sync {
    /// Start generating. Connection failures surface here; failures
    /// mid-stream surface as stream items.
    async fn generate(&self, prompt: &str) -> Result<FragmentStream>;

    fn name(&self) -> &str;
}

/// Offline oracle that streams the prompt back word by word
#[derive(Debug, Clone, Default)]
pub struct EchoGenerator;

impl EchoGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GenerationOracle for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<FragmentStream> {
        let fragments: Vec<Result<String>> = prompt.split_inclusive(' ').map(|w| Ok(w.to_string())).collect();
        Ok(stream::iter(fragments).boxed())
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Streaming chat completions client
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: [CompletionMessage<'a>; 1],
}

#[derive(Serialize)]
struct CompletionMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl OpenAiGenerator {
    /// `read_timeout` bounds the gap between stream chunks, not the whole
    /// completion.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build generation client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        })
    }
}

#[async_trait]
impl GenerationOracle for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<FragmentStream> {
        let body = CompletionRequest {
            model: &self.model,
            stream: true,
            messages: [CompletionMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "Generation request failed");
            Error::oracle("generation backend unreachable")
        })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Generation backend returned an error");
            return Err(Error::oracle(format!("generation backend returned {}", response.status())));
        }

        Ok(decode_stream(response.bytes_stream().boxed()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// SSE decoding state for one response
#[derive(Debug, Default)]
pub struct SseDecoder {
    adapter: OpenAiAdapter,
    buffer: EventBuffer,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning any complete fragments
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<String> {
        let events = self.buffer.push(bytes);
        self.parse_events(events)
    }

    /// Flush whatever the buffer still holds once the body ends
    pub fn finish(&mut self) -> Vec<String> {
        let rest = self.buffer.finish().into_iter().collect();
        let fragments = self.parse_events(rest);
        self.finished = true;
        fragments
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn parse_events(&mut self, events: Vec<String>) -> Vec<String> {
        let mut fragments = Vec::new();
        for event in events {
            if self.finished {
                break;
            }
            for chunk in self.adapter.parse(&event) {
                match chunk {
                    ParsedChunk::Content(text) => fragments.push(text),
                    ParsedChunk::Done { finish_reason } => {
                        debug!(finish_reason = ?finish_reason, "Generation stream finished");
                        self.finished = true;
                        break;
                    }
                    ParsedChunk::Error(e) => debug!(error = %e, "Skipping malformed stream event"),
                    ParsedChunk::Empty => {}
                }
            }
        }
        fragments
    }
}

fn decode_stream(body: BoxStream<'static, reqwest::Result<bytes::Bytes>>) -> FragmentStream {
    stream::unfold((body, SseDecoder::new()), |(mut body, mut decoder)| async move {
        loop {
            if decoder.is_finished() {
                return None;
            }

            let items: Vec<Result<String>> = match body.next().await {
                Some(Ok(bytes)) => decoder.decode(&bytes).into_iter().map(Ok).collect(),
                Some(Err(e)) => {
                    warn!(error = %e, "Generation stream interrupted");
                    decoder.finished = true;
                    vec![Err(Error::oracle("generation stream interrupted"))]
                }
                None => decoder.finish().into_iter().map(Ok).collect(),
            };

            if !items.is_empty() {
                return Some((stream::iter(items), (body, decoder)));
            }
        }
    })
    .flatten()
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_streams_prompt_back() {
        let stream = EchoGenerator::new().generate("My email is [REDACTED_EMAIL]").await.unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;

        assert_eq!(fragments, vec!["My ", "email ", "is ", "[REDACTED_EMAIL]"]);
        assert_eq!(fragments.concat(), "My email is [REDACTED_EMAIL]");
    }

    #[test]
    fn test_decoder_handles_split_events() {
        let mut decoder = SseDecoder::new();
        let first = br#"data: {"choices":[{"delta":{"content":"Hel"#;
        let second = b"lo\"},\"finish_reason\":null}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" world\"},\"finish_reason\":null}]}\n\n";

        assert!(decoder.decode(first).is_empty());
        assert_eq!(decoder.decode(second), vec!["Hello", " world"]);
        assert!(!decoder.is_finished());
    }

    #[test]
    fn test_decoder_stops_at_done_marker() {
        let mut decoder = SseDecoder::new();
        let body = b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"},\"finish_reason\":null}]}\n\ndata: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"},\"finish_reason\":null}]}\n\n";

        assert_eq!(decoder.decode(body), vec!["a"]);
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_decoder_flushes_unterminated_tail() {
        let mut decoder = SseDecoder::new();
        assert!(decoder
            .decode(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"},\"finish_reason\":null}]}")
            .is_empty());
        assert_eq!(decoder.finish(), vec!["tail"]);
        assert!(decoder.is_finished());
    }
}
