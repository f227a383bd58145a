use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::ModelBackend;
use crate::config::AppConfig;
use crate::history::ChatHistory;
use crate::process::ManagedProcess;
use crate::prober::ReadinessProber;
use crate::types::BackendState;

/// Shared state handed to every route:
/// - config: immutable settings
/// - backend / prober: client of the inference daemon
/// - startup: readiness snapshot from the startup sequence, read-only
/// - process: the daemon we may have launched
/// - history: chat log, `None` when the database could not be opened
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub backend: Arc<dyn ModelBackend>,
    pub prober: ReadinessProber,
    pub startup: BackendState,
    pub process: Mutex<ManagedProcess>,
    pub history: Option<ChatHistory>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        backend: Arc<dyn ModelBackend>,
        startup: BackendState,
        process: ManagedProcess,
        history: Option<ChatHistory>,
    ) -> Arc<Self> {
        let prober = ReadinessProber::new(backend.clone());
        Arc::new(Self {
            config,
            backend,
            prober,
            startup,
            process: Mutex::new(process),
            history,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }

    /// Remediation text for a backend that is down.
    pub fn unavailable_message(&self) -> String {
        format!(
            "Model backend is not running at {}. Start it with: {} serve",
            self.backend.endpoint(),
            self.config.backend_binary
        )
    }

    /// Stop the daemon if this service launched it.
    pub fn shutdown_backend(&self) {
        self.process.lock().stop();
    }
}
