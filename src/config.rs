use std::path::PathBuf;
use std::time::Duration;

use rocket::figment::Figment;
use serde::{Deserialize, Serialize};

/// Backend tuning written to the Ollama config file before launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuSettings {
    pub num_gpu: u32,
    pub main_gpu: u32,
    pub num_thread: u32,
    pub batch_size: u32,
    /// Value exported as `OLLAMA_GPU` to a backend we launch.
    pub accelerator: String,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            num_gpu: 1,
            main_gpu: 0,
            num_thread: 4,
            batch_size: 512,
            accelerator: "cuda".to_string(),
        }
    }
}

/// Fixed per-request generation policy. Users never control these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// GPU layers offloaded by the backend.
    pub num_gpu: u32,
    pub num_thread: u32,
    /// Maximum output tokens.
    pub num_predict: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            num_gpu: 1,
            num_thread: 8,
            num_predict: 512,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
        }
    }
}

/// Application configuration.
///
/// Extracted once from Rocket's figment (`Rocket.toml` and `ROCKET_*`
/// environment variables) and passed to every component by `Arc`.
/// Every key is optional; missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model_name: String,
    pub backend_url: String,
    pub backend_binary: String,
    /// Where the backend tuning file is written. Defaults to `~/.ollama/config.json`.
    pub backend_config_path: Option<PathBuf>,
    pub startup_attempts: u32,
    pub startup_interval_secs: u64,
    pub pull_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub max_question_chars: usize,
    pub database_path: PathBuf,
    pub frontend_dir: PathBuf,
    pub stop_backend_on_shutdown: bool,
    pub gpu: GpuSettings,
    pub generation: GenerationOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_name: "llama3:8b-instruct-q4_0".to_string(),
            backend_url: "http://127.0.0.1:11434".to_string(),
            backend_binary: "ollama".to_string(),
            backend_config_path: None,
            startup_attempts: 10,
            startup_interval_secs: 1,
            pull_timeout_secs: 3600,
            probe_timeout_secs: 5,
            max_question_chars: 1000,
            database_path: PathBuf::from("chat_history.db"),
            frontend_dir: PathBuf::from("frontend"),
            stop_backend_on_shutdown: false,
            gpu: GpuSettings::default(),
            generation: GenerationOptions::default(),
        }
    }
}

impl AppConfig {
    pub fn from_figment(figment: &Figment) -> anyhow::Result<Self> {
        let config: AppConfig = figment.extract()?;
        if !config.backend_url.starts_with("http://") && !config.backend_url.starts_with("https://")
        {
            anyhow::bail!("backend_url must start with http:// or https://");
        }
        Ok(config)
    }

    pub fn startup_interval(&self) -> Duration {
        Duration::from_secs(self.startup_interval_secs)
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// `host:port` part of `backend_url`, as `OLLAMA_HOST` expects it.
    pub fn backend_host(&self) -> &str {
        let rest = self
            .backend_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.backend_url);
        rest.trim_end_matches('/')
    }

    pub fn backend_config_path(&self) -> Option<PathBuf> {
        self.backend_config_path.clone().or_else(|| {
            dirs::home_dir().map(|home| home.join(".ollama").join("config.json"))
        })
    }
}
