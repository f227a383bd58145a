//! Per-request flow: validate, check backend, dispatch, package.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::types::ChatMessage;

#[derive(Debug, Clone)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub elapsed: Duration,
    pub model: String,
}

impl Answer {
    /// Elapsed seconds rounded to two decimals.
    pub fn processing_time(&self) -> f64 {
        (self.elapsed.as_secs_f64() * 100.0).round() / 100.0
    }
}

/// Trim and bound the user's question.
pub fn validate(raw: &str, max_chars: usize) -> Result<&str, ApiError> {
    let question = raw.trim();
    if question.is_empty() {
        return Err(ApiError::Validation("Question must not be empty".to_string()));
    }
    if question.chars().count() > max_chars {
        return Err(ApiError::Validation(format!(
            "Question is too long (max {max_chars} characters)"
        )));
    }
    Ok(question)
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

/// Answer one question. The backend is only called after a fresh, successful probe.
pub async fn answer(state: &AppState, raw: &str) -> Result<Answer, ApiError> {
    let question = validate(raw, state.config.max_question_chars)?;

    if !state.prober.probe().await {
        warn!(startup_ready = state.startup.is_ready(), "rejecting question, model backend down");
        return Err(ApiError::Unavailable(state.unavailable_message()));
    }

    info!(question = %preview(question), "dispatching question");
    let started = Instant::now();
    let result = state
        .backend
        .chat(
            state.model_name(),
            &[ChatMessage::user(question)],
            &state.config.generation,
        )
        .await;
    let elapsed = started.elapsed();

    let completion = result.map_err(|e| {
        warn!(error = %e, "generation failed");
        if e.is_unreachable() {
            ApiError::Unavailable(state.unavailable_message())
        } else {
            ApiError::Internal(format!("Internal server error: {e}"))
        }
    })?;

    info!(
        elapsed_secs = elapsed.as_secs_f64(),
        answer_chars = completion.text.chars().count(),
        "answer ready"
    );

    if let Some(history) = &state.history {
        if let Err(e) = history
            .record(question, &completion.text, state.model_name())
            .await
        {
            warn!(error = %e, "failed to record chat history");
        }
    }

    Ok(Answer {
        question: question.to_string(),
        text: completion.text,
        elapsed,
        model: state.model_name().to_string(),
    })
}
