//! Startup sequence that brings the model backend up before serving traffic.
//!
//! Every step degrades a readiness flag on failure instead of aborting, so the
//! HTTP server always starts, fully degraded if need be.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use futures_util::StreamExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{model_matches, ModelBackend, ProgressStream};
use crate::config::AppConfig;
use crate::error::BackendError;
use crate::process::{ManagedProcess, ProcessState};
use crate::prober::ReadinessProber;
use crate::progress::PullProgress;
use crate::types::BackendState;

/// Contents of the backend tuning file.
#[derive(Debug, Serialize)]
struct BackendTuning<'a> {
    host: &'a str,
    num_gpu: u32,
    num_thread: u32,
    batch_size: u32,
    main_gpu: u32,
}

pub struct LifecycleOrchestrator {
    config: Arc<AppConfig>,
    backend: Arc<dyn ModelBackend>,
    prober: ReadinessProber,
}

impl LifecycleOrchestrator {
    pub fn new(config: Arc<AppConfig>, backend: Arc<dyn ModelBackend>) -> Self {
        let prober = ReadinessProber::new(backend.clone());
        Self {
            config,
            backend,
            prober,
        }
    }

    /// Run the full startup sequence once. Never fails.
    pub async fn run(&self, process: &mut ManagedProcess) -> BackendState {
        info!(model = %self.config.model_name, "preparing model backend");
        let mut state = BackendState::offline(&self.config.model_name);

        match self.write_backend_config() {
            Ok(path) => info!(path = %path.display(), "backend config written"),
            Err(e) => warn!(error = %e, "could not write backend config, continuing"),
        }

        state.running = self.ensure_running(process).await;
        if !state.running {
            warn!("continuing without model backend");
            return state;
        }

        state.model_available = self.ensure_model().await;

        if state.is_ready() {
            info!(model = %state.model_name, "model backend ready");
        } else {
            warn!(model = %state.model_name, "model backend running but model unavailable");
        }
        state
    }

    /// Write GPU/thread/batch tuning to the backend's config file.
    pub fn write_backend_config(&self) -> anyhow::Result<PathBuf> {
        let path = self
            .config
            .backend_config_path()
            .context("no home directory for backend config")?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }

        let gpu = &self.config.gpu;
        let tuning = BackendTuning {
            host: self.config.backend_host(),
            num_gpu: gpu.num_gpu,
            num_thread: gpu.num_thread,
            batch_size: gpu.batch_size,
            main_gpu: gpu.main_gpu,
        };
        let json = serde_json::to_string_pretty(&tuning)?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    /// Probe, and launch the daemon if nothing answers.
    pub async fn ensure_running(&self, process: &mut ManagedProcess) -> bool {
        if self.prober.probe().await {
            info!(endpoint = %self.backend.endpoint(), "model backend already running");
            process.adopt_running();
            return true;
        }

        info!(endpoint = %self.backend.endpoint(), "model backend not running, launching");
        let state = process
            .start(
                &self.prober,
                self.config.startup_attempts,
                self.config.startup_interval(),
            )
            .await;
        state == ProcessState::Running
    }

    /// Check the target model is installed, pulling it if not.
    pub async fn ensure_model(&self) -> bool {
        let model = &self.config.model_name;
        let listing = tokio::time::timeout(self.config.probe_timeout(), self.backend.list_models());
        let installed = match listing.await {
            Ok(Ok(models)) => models,
            Ok(Err(e)) => {
                warn!(error = %e, "could not list installed models");
                return false;
            }
            Err(_) => {
                warn!("listing installed models timed out");
                return false;
            }
        };

        if installed.iter().any(|m| model_matches(&m.name, model)) {
            info!(model = %model, "model available");
            return true;
        }

        let names: Vec<&str> = installed.iter().map(|m| m.name.as_str()).collect();
        warn!(model = %model, available = ?names, "model not installed, pulling");

        match self.pull(model).await {
            Ok(()) => {
                info!(model = %model, "model pulled");
                true
            }
            Err(e) => {
                warn!(model = %model, error = %e, "model pull failed");
                false
            }
        }
    }

    /// Request the pull and drain it, all under `pull_timeout`.
    async fn pull(&self, model: &str) -> Result<(), BackendError> {
        let timeout = self.config.pull_timeout();
        let pull = async {
            let stream = self.backend.pull_model(model).await?;
            drain(stream).await.map(|_| ())
        };
        match tokio::time::timeout(timeout, pull).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::PullFailed(format!(
                "timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }
}

/// Consume a pull stream up to its `success` event or its end, logging
/// progress. Returns the final percentage.
async fn drain(mut stream: ProgressStream) -> Result<f64, BackendError> {
    let mut progress = PullProgress::new();
    while let Some(event) = stream.next().await {
        let event = event?;
        if event.status == "success" {
            break;
        }
        match progress.observe(&event) {
            Some(percent) => info!("model download progress: {percent:.1}%"),
            None => debug!(status = %event.status, "model pull"),
        }
    }
    let percent = progress.finish();
    info!("model download progress: {percent:.1}%");
    Ok(percent)
}
