#[macro_use]
extern crate rocket;

mod api;
mod app_state;
mod backend;
mod config;
mod cors;
mod error;
mod handler;
mod history;
#[cfg(test)]
mod mock;
mod ollama;
mod orchestrator;
mod prober;
mod process;
mod progress;
mod types;

use std::sync::Arc;

use rocket::fairing::AdHoc;
use rocket::fs::{FileServer, Options};
use rocket::{Build, Rocket};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use api::{ai_question, api_chat, chat_history, health, index, list_models, system_info};
use app_state::AppState;
use config::AppConfig;
use history::ChatHistory;
use ollama::OllamaClient;
use orchestrator::LifecycleOrchestrator;
use process::{ManagedProcess, OllamaServeProcess};

pub fn build_rocket(state: Arc<AppState>) -> Rocket<Build> {
    let static_dir = state.config.frontend_dir.join("static");
    let stop_on_shutdown = state.config.stop_backend_on_shutdown;

    let mut rocket = rocket::build()
        .attach(cors::Cors)
        .mount(
            "/",
            routes![
                index,
                ai_question,
                api_chat,
                health,
                list_models,
                system_info,
                chat_history,
                cors::preflight,
            ],
        )
        .mount("/static", FileServer::new(static_dir, Options::Index | Options::Missing))
        .register("/", catchers![api::default_catcher]);

    if stop_on_shutdown {
        rocket = rocket.attach(AdHoc::on_shutdown("Stop model backend", |rocket| {
            Box::pin(async move {
                if let Some(state) = rocket.state::<Arc<AppState>>() {
                    state.shutdown_backend();
                }
            })
        }));
    }

    rocket.manage(state)
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("neurochat=info,rocket=warn")),
        )
        .init();

    let config = Arc::new(AppConfig::from_figment(&rocket::Config::figment())?);
    let backend = Arc::new(OllamaClient::new(
        config.backend_url.clone(),
        config.probe_timeout(),
    ));
    info!(model = %config.model_name, backend = %backend.base_url(), "starting neurochat");

    // Blocks until the backend is ready or we have given up on it.
    let mut process = ManagedProcess::new(Box::new(OllamaServeProcess::new(&config)));
    let startup = LifecycleOrchestrator::new(config.clone(), backend.clone())
        .run(&mut process)
        .await;
    info!(
        running = startup.running,
        model_available = startup.model_available,
        process = ?process.state(),
        pid = ?process.pid(),
        "startup sequence finished"
    );

    let history = match ChatHistory::open(&config.database_path).await {
        Ok(history) => Some(history),
        Err(e) => {
            warn!(path = %config.database_path.display(), error = %e, "chat history disabled");
            None
        }
    };

    let state = AppState::new(config, backend, startup, process, history);
    let _ = build_rocket(state).launch().await?;
    Ok(())
}
