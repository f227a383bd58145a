//! `ModelBackend` over the Ollama HTTP API.

use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{ModelBackend, ProgressStream};
use crate::config::GenerationOptions;
use crate::error::BackendError;
use crate::types::{ChatMessage, CompletionResult, ModelDescriptor, ModelDetails, ProgressEvent};

pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    probe_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: &'a GenerationOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
    #[serde(default)]
    size: u64,
    modified_at: Option<String>,
    #[serde(default)]
    details: TagDetails,
}

#[derive(Debug, Default, Deserialize)]
struct TagDetails {
    parameter_size: Option<String>,
    quantization_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShowResponse {
    parameters: Option<String>,
    #[serde(default)]
    details: TagDetails,
}

#[derive(Debug, Deserialize)]
struct PullLine {
    #[serde(flatten)]
    event: ProgressEvent,
    error: Option<String>,
}

impl From<TagModel> for ModelDescriptor {
    fn from(m: TagModel) -> Self {
        ModelDescriptor {
            name: m.name,
            size: m.size,
            parameter_size: m.details.parameter_size,
            quantization_level: m.details.quantization_level,
            modified_at: m.modified_at,
        }
    }
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, probe_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            probe_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_send_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_connect() || e.is_timeout() {
            BackendError::Unreachable(self.base_url.clone())
        } else {
            BackendError::Http(e)
        }
    }
}

#[async_trait]
impl ModelBackend for OllamaClient {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, BackendError> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(BackendError::Unreachable(format!(
                "{} (HTTP {})",
                self.base_url,
                response.status()
            )));
        }

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(ModelDescriptor::from).collect())
    }

    async fn pull_model(&self, name: &str) -> Result<ProgressStream, BackendError> {
        let response = self
            .client
            .post(self.url("/api/pull"))
            .json(&serde_json::json!({ "name": name, "stream": true }))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::PullFailed(format!("{}: {}", status, text)));
        }

        let stream: ProgressStream = Box::pin(pull_events(response.bytes_stream()));
        Ok(stream)
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<CompletionResult, BackendError> {
        let request = ChatRequest {
            model,
            messages,
            stream: false,
            options,
        };

        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_send_error(e))?;
        parse_chat_response(status, &text)
    }

    async fn show_model(&self, name: &str) -> Result<ModelDetails, BackendError> {
        let response = self
            .client
            .post(self.url("/api/show"))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Generation(format!("{}: {}", status, text)));
        }

        let show: ShowResponse = response.json().await?;
        Ok(ModelDetails {
            parameters: show.parameters,
            parameter_size: show.details.parameter_size,
        })
    }

    async fn heartbeat(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .get(self.url("/api/version"))
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::Unreachable(self.base_url.clone()))
        }
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}

/// Split a pull response body into NDJSON lines and decode each one.
fn pull_events<S, B>(bytes: S) -> impl Stream<Item = Result<ProgressEvent, BackendError>> + Send + 'static
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| BackendError::PullFailed(e.to_string()))?;
            buf.extend_from_slice(chunk.as_ref());
            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                if let Some(event) = parse_pull_line(&line)? {
                    yield event;
                }
            }
        }
        if let Some(event) = parse_pull_line(&buf)? {
            yield event;
        }
    }
}

/// Turn a non-streaming `/api/chat` reply into a completion. An `error`
/// field wins over the status code.
fn parse_chat_response(status: StatusCode, text: &str) -> Result<CompletionResult, BackendError> {
    let body: Option<ChatResponse> = serde_json::from_str(text).ok();

    if let Some(error) = body.as_ref().and_then(|b| b.error.clone()) {
        return Err(BackendError::Generation(error));
    }
    if !status.is_success() {
        return Err(BackendError::Generation(format!("{}: {}", status, text)));
    }

    body.and_then(|b| b.message)
        .map(|m| CompletionResult { text: m.content })
        .ok_or_else(|| BackendError::Generation("No message in backend response".to_string()))
}

/// Parse one NDJSON line of a pull response. Blank lines yield `None`.
fn parse_pull_line(line: &[u8]) -> Result<Option<ProgressEvent>, BackendError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let line: PullLine = serde_json::from_str(text)?;
    if let Some(error) = line.error {
        return Err(BackendError::PullFailed(error));
    }
    debug!(status = %line.event.status, "pull event");
    Ok(Some(line.event))
}
