use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::process::ProcessState;

/// Readiness snapshot produced by the lifecycle orchestrator at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendState {
    pub running: bool,
    pub model_available: bool,
    pub model_name: String,
}

impl BackendState {
    pub fn offline(model_name: &str) -> Self {
        Self {
            running: false,
            model_available: false,
            model_name: model_name.to_string(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.running && self.model_available
    }
}

/// A model installed on the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    /// Size on disk in bytes.
    pub size: u64,
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
    pub modified_at: Option<String>,
}

/// Parameter information reported by `/api/show`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelDetails {
    pub parameters: Option<String>,
    pub parameter_size: Option<String>,
}

/// One line of a model pull stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProgressEvent {
    #[serde(default)]
    pub status: String,
    pub digest: Option<String>,
    pub completed: Option<u64>,
    pub total: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResult {
    pub text: String,
}

/// Persisted question/answer pair.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChatExchange {
    pub id: i64,
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
    pub model: Option<String>,
}

// ---- HTTP bodies ----

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionRequest {
    #[serde(default)]
    pub question: String,
}

/// `/api/chat` accepts either `message` or `question`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub question: Option<String>,
}

impl ChatRequest {
    pub fn text(&self) -> &str {
        self.message
            .as_deref()
            .or(self.question.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub question: String,
    pub answer: String,
    pub processing_time: f64,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub response: String,
    pub question: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub ollama: String,
    pub model: String,
    pub model_name: String,
    pub gpu: String,
    /// State of a backend process launched by this service.
    pub backend_process: ProcessState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfoResponse {
    pub gpu_available: bool,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_parameters: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_size: Option<String>,
    pub system: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<ChatExchange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
