use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::config::GenerationOptions;
use crate::error::BackendError;
use crate::types::{ChatMessage, CompletionResult, ModelDescriptor, ModelDetails, ProgressEvent};

/// Finite, non-restartable stream of pull progress events.
pub type ProgressStream = BoxStream<'static, Result<ProgressEvent, BackendError>>;

/// Client side of the local inference daemon.
///
/// Implementations never retry; retry policy belongs to the prober and the
/// orchestrator.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, BackendError>;

    async fn pull_model(&self, name: &str) -> Result<ProgressStream, BackendError>;

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<CompletionResult, BackendError>;

    async fn show_model(&self, name: &str) -> Result<ModelDetails, BackendError>;

    /// Cheapest call that proves the daemon is answering.
    async fn heartbeat(&self) -> Result<(), BackendError> {
        self.list_models().await.map(|_| ())
    }

    /// Base URL, for log lines and remediation messages.
    fn endpoint(&self) -> &str;
}

/// Whether `installed` names the same model as `wanted`. An untagged name means `:latest`.
pub fn model_matches(installed: &str, wanted: &str) -> bool {
    fn normalize(name: &str) -> String {
        if name.contains(':') {
            name.to_string()
        } else {
            format!("{name}:latest")
        }
    }
    installed == wanted || normalize(installed) == normalize(wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_matches() {
        assert!(model_matches("llama3:8b-instruct-q4_0", "llama3:8b-instruct-q4_0"));
        assert!(model_matches("llama3:latest", "llama3"));
        assert!(model_matches("llama3", "llama3:latest"));
        assert!(!model_matches("llama3:70b", "llama3"));
        assert!(!model_matches("llama3:8b", "llama3:8b-instruct-q4_0"));
    }
}
