// ============================================================================
// Chat Infrastructure - OpenAI-compatible Completion Provider
// File: crates/chat-infrastructure/src/llm/openai_client.rs
// Description: Blocking and SSE streaming calls to /v1/chat/completions
// ============================================================================

use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, warn};

use chat_core::error::DomainError;
use chat_core::providers::{CompletionProvider, CompletionRequest, FragmentStream, PromptMessage};

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    temperature: f32,
    top_p: f32,
    n: u32,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    stop: &'a [String],
    max_tokens: u32,
    presence_penalty: f32,
    frequency_penalty: f32,
    stream: bool,
}

impl<'a> ChatCompletionBody<'a> {
    fn new(request: &'a CompletionRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            top_p: request.top_p,
            n: request.n,
            stop: &request.stop,
            max_tokens: request.max_tokens,
            presence_penalty: request.presence_penalty,
            frequency_penalty: request.frequency_penalty,
            stream,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChoiceChunk>,
}

#[derive(Debug, Deserialize)]
struct ChoiceChunk {
    /// Absent from some compatible servers; treated as the first choice
    #[serde(default)]
    index: u32,
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// One decoded SSE line
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Fragment(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseLine, DomainError> {
    let line = line.trim_end_matches('\r');
    let Some(payload) = line.strip_prefix("data:") else {
        // blank separators, comments, event/id fields
        return Ok(SseLine::Skip);
    };
    let payload = payload.trim_start();
    if payload == "[DONE]" {
        return Ok(SseLine::Done);
    }
    if payload.is_empty() {
        return Ok(SseLine::Skip);
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(payload)
        .map_err(|e| DomainError::Provider(format!("Malformed stream chunk: {}", e)))?;
    // Only the first choice is accumulated into the reply
    let content = chunk
        .choices
        .into_iter()
        .find(|c| c.index == 0)
        .and_then(|c| c.delta.content);
    match content {
        Some(content) if !content.is_empty() => Ok(SseLine::Fragment(content)),
        _ => Ok(SseLine::Skip),
    }
}

/// Decode an SSE byte stream into content fragments. Lines may be split
/// across network chunks. The stream must end with `data: [DONE]`.
fn sse_fragments<S, B, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut pending: Vec<u8> = Vec::new();
        let mut done = false;

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk
                .map_err(|e| DomainError::Provider(format!("Stream error: {}", e)))?;
            pending.extend_from_slice(chunk.as_ref());

            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8(raw)
                    .map_err(|e| DomainError::Provider(format!("Invalid UTF-8 in stream: {}", e)))?;
                match parse_sse_line(line.trim_end_matches('\n'))? {
                    SseLine::Fragment(text) => {
                        yield text;
                    }
                    SseLine::Done => {
                        done = true;
                        break;
                    }
                    SseLine::Skip => {}
                }
            }
            if done {
                break;
            }
        }

        if !done && !pending.is_empty() {
            let line = String::from_utf8_lossy(&pending).into_owned();
            match parse_sse_line(&line)? {
                SseLine::Fragment(text) => {
                    yield text;
                }
                SseLine::Done => done = true,
                SseLine::Skip => {}
            }
        }

        if !done {
            warn!("Provider stream ended without [DONE]");
            Err::<(), _>(DomainError::Provider("stream ended without [DONE]".to_string()))?;
        }
    })
}

/// Completion provider speaking the OpenAI chat-completions protocol
#[derive(Clone)]
pub struct OpenAiCompletionProvider {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiCompletionProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DomainError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| DomainError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, DomainError> {
        let mut builder = self
            .client
            .post(self.endpoint())
            .json(&ChatCompletionBody::new(request, stream));
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        // Streams are bounded by the caller's deadline, not the client timeout
        if !stream {
            builder = builder.timeout(self.timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DomainError::Provider(format!("Failed to call LLM API: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::Provider(format!(
                "LLM API error: {} - {}",
                status, body
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletionProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String, DomainError> {
        debug!(
            "Starting completion with {} messages on {}",
            request.messages.len(),
            request.model
        );
        let response = self.send(&request, false).await?;

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Provider(format!("Failed to parse LLM response: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| DomainError::Provider("No choices returned from LLM".to_string()))
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<FragmentStream, DomainError> {
        debug!(
            "Starting completion stream with {} messages on {}",
            request.messages.len(),
            request.model
        );
        let response = self.send(&request, true).await?;
        Ok(sse_fragments(response.bytes_stream()))
    }
}
