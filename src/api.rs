use std::sync::Arc;

use rocket::fs::NamedFile;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{catch, get, post, Request, State};
use tracing::warn;

use crate::app_state::AppState;
use crate::backend::model_matches;
use crate::error::ApiError;
use crate::handler;
use crate::types::{
    ChatRequest,
    ChatResponse,
    ErrorBody,
    HealthResponse,
    HistoryResponse,
    ModelsResponse,
    QuestionRequest,
    QuestionResponse,
    SystemInfoResponse,
};

const DEFAULT_HISTORY_LIMIT: u32 = 20;
const MAX_HISTORY_LIMIT: u32 = 200;

#[get("/")]
pub async fn index(state: &State<Arc<AppState>>) -> Option<NamedFile> {
    let page = state.config.frontend_dir.join("templates").join("index.html");
    NamedFile::open(page).await.ok()
}

#[post("/ai-question", data = "<req>")]
pub async fn ai_question(
    state: &State<Arc<AppState>>,
    req: Json<QuestionRequest>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let answer = handler::answer(state, &req.question).await?;

    Ok(Json(QuestionResponse {
        processing_time: answer.processing_time(),
        question: answer.question,
        answer: answer.text,
        model: answer.model,
    }))
}

#[post("/api/chat", data = "<req>")]
pub async fn api_chat(
    state: &State<Arc<AppState>>,
    req: Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let answer = handler::answer(state, req.text()).await?;

    Ok(Json(ChatResponse {
        message: answer.text.clone(),
        response: answer.text,
        question: answer.question,
        model: answer.model,
    }))
}

/// Fresh probe plus model check; never fails.
#[get("/health")]
pub async fn health(state: &State<Arc<AppState>>) -> (Status, Json<HealthResponse>) {
    let backend_process = state.process.lock().refresh();
    let running = state.prober.probe().await;
    let model_available = running
        && match state.backend.list_models().await {
            Ok(models) => models.iter().any(|m| model_matches(&m.name, state.model_name())),
            Err(e) => {
                warn!(error = %e, "health check could not list models");
                false
            }
        };

    let (status, code) = match (running, model_available) {
        (true, true) => ("healthy", Status::Ok),
        (true, false) => ("degraded", Status::Ok),
        (false, _) => ("unhealthy", Status::ServiceUnavailable),
    };

    let body = HealthResponse {
        status: status.to_string(),
        ollama: if running { "running" } else { "not running" }.to_string(),
        model: if model_available { "available" } else { "not available" }.to_string(),
        model_name: state.model_name().to_string(),
        gpu: if state.config.gpu.num_gpu > 0 { "enabled" } else { "disabled" }.to_string(),
        backend_process,
    };
    (code, Json(body))
}

#[get("/models")]
pub async fn list_models(state: &State<Arc<AppState>>) -> Result<Json<ModelsResponse>, ApiError> {
    let models = state.backend.list_models().await.map_err(|e| {
        if e.is_unreachable() {
            ApiError::Unavailable(state.unavailable_message())
        } else {
            ApiError::Internal(e.to_string())
        }
    })?;
    Ok(Json(ModelsResponse { models }))
}

#[get("/system-info")]
pub async fn system_info(state: &State<Arc<AppState>>) -> Json<SystemInfoResponse> {
    let system = std::env::consts::OS.to_string();
    let model = state.model_name().to_string();

    let details = match state.backend.show_model(&model).await {
        Ok(details) => details,
        Err(e) => {
            return Json(SystemInfoResponse {
                gpu_available: false,
                model,
                model_parameters: None,
                model_size: None,
                system,
                error: Some(e.to_string()),
            })
        }
    };

    let model_size = match state.backend.list_models().await {
        Ok(models) => models
            .iter()
            .find(|m| model_matches(&m.name, &model))
            .map(|m| format_size(m.size)),
        Err(_) => None,
    };

    Json(SystemInfoResponse {
        gpu_available: state.config.gpu.num_gpu > 0,
        model,
        model_parameters: details.parameter_size.or(details.parameters),
        model_size,
        system,
        error: None,
    })
}

#[get("/history?<limit>")]
pub async fn chat_history(
    state: &State<Arc<AppState>>,
    limit: Option<u32>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let store = state
        .history
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Chat history is disabled".to_string()))?;
    let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);

    let history = store
        .recent(limit)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(HistoryResponse { history }))
}

#[catch(default)]
pub fn default_catcher(status: Status, _req: &Request<'_>) -> (Status, Json<ErrorBody>) {
    let error = match status.code {
        400 | 422 => "Malformed request body".to_string(),
        404 => "Not found".to_string(),
        _ => status.reason().unwrap_or("Internal server error").to_string(),
    };
    (status, Json(ErrorBody { error }))
}

/// Human-readable byte count.
fn format_size(size: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let size_f = size as f64;
    if size_f > GB {
        format!("{:.2} GiB", size_f / GB)
    } else if size_f > MB {
        format!("{:.2} MiB", size_f / MB)
    } else if size_f > KB {
        format!("{:.2} KiB", size_f / KB)
    } else {
        format!("{size} B")
    }
}
