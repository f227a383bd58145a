//! Lifecycle of the backend daemon process.

use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::BackendError;
use crate::prober::ReadinessProber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessState {
    NotStarted,
    Starting,
    Running,
    Failed,
}

/// Something that can spawn and kill the backend daemon.
pub trait ServerProcess: Send + Sync {
    /// Spawn the daemon in the background and return its PID.
    fn spawn(&mut self) -> Result<u32, BackendError>;

    fn stop(&mut self);

    fn is_alive(&mut self) -> bool;
}

/// `ollama serve`, detached, with stdio discarded.
pub struct OllamaServeProcess {
    binary: String,
    host: String,
    accelerator: String,
    child: Option<Child>,
}

impl OllamaServeProcess {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            binary: config.backend_binary.clone(),
            host: config.backend_host().to_string(),
            accelerator: config.gpu.accelerator.clone(),
            child: None,
        }
    }
}

impl ServerProcess for OllamaServeProcess {
    fn spawn(&mut self) -> Result<u32, BackendError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("serve")
            .env("OLLAMA_HOST", &self.host)
            .env("OLLAMA_GPU", &self.accelerator)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Keep terminal signals (Ctrl-C) away from the daemon.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command
            .spawn()
            .map_err(|e| BackendError::Spawn(format!("{}: {}", self.binary, e)))?;
        let pid = child.id();
        debug!(pid, binary = %self.binary, "backend process spawned");
        self.child = Some(child);
        Ok(pid)
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            info!(pid = child.id(), "stopping backend process");
            match child.try_wait() {
                Ok(Some(status)) => debug!(?status, "backend process already exited"),
                _ => {
                    if let Err(e) = child.kill() {
                        warn!(error = %e, "failed to kill backend process");
                    }
                    let _ = child.wait();
                }
            }
        }
    }

    fn is_alive(&mut self) -> bool {
        match self.child.as_mut().map(|c| c.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(_))) => {
                self.child = None;
                false
            }
            _ => false,
        }
    }
}

/// Backend daemon with an explicit lifecycle state.
pub struct ManagedProcess {
    state: ProcessState,
    process: Box<dyn ServerProcess>,
    /// Set only when this service spawned the daemon.
    pid: Option<u32>,
}

impl ManagedProcess {
    pub fn new(process: Box<dyn ServerProcess>) -> Self {
        Self {
            state: ProcessState::NotStarted,
            process,
            pid: None,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Record a daemon that was already answering before we looked.
    pub fn adopt_running(&mut self) {
        self.state = ProcessState::Running;
    }

    /// Spawn the daemon and wait, bounded, for it to answer probes.
    pub async fn start(
        &mut self,
        prober: &ReadinessProber,
        max_attempts: u32,
        interval: Duration,
    ) -> ProcessState {
        self.state = ProcessState::Starting;

        match self.process.spawn() {
            Ok(pid) => {
                info!(pid, "launched model backend");
                self.pid = Some(pid);
            }
            Err(e) => {
                warn!(error = %e, "could not launch model backend");
                self.state = ProcessState::Failed;
                return self.state;
            }
        }

        self.state = if prober.wait_until_ready(max_attempts, interval).await {
            ProcessState::Running
        } else {
            ProcessState::Failed
        };
        self.state
    }

    /// Re-check a daemon this service spawned; a dead child moves the state to `Failed`.
    pub fn refresh(&mut self) -> ProcessState {
        if let Some(pid) = self.pid {
            if !self.process.is_alive() {
                warn!(pid, "model backend process exited");
                self.pid = None;
                self.state = ProcessState::Failed;
            }
        }
        self.state
    }

    /// Kill the daemon if this service spawned it. An adopted daemon is left alone.
    pub fn stop(&mut self) {
        if self.pid.take().is_some() {
            self.process.stop();
            self.state = ProcessState::NotStarted;
        }
    }
}
