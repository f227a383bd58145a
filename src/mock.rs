//! In-memory backend and process doubles for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;

use crate::backend::{ModelBackend, ProgressStream};
use crate::config::GenerationOptions;
use crate::error::BackendError;
use crate::process::ServerProcess;
use crate::types::{ChatMessage, CompletionResult, ModelDescriptor, ModelDetails, ProgressEvent};

pub const ENDPOINT: &str = "http://mock-backend:11434";

#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Generation(String),
    Unreachable,
}

#[derive(Debug, Clone)]
pub enum PullScript {
    Complete(Vec<ProgressEvent>),
    FailAfter(Vec<ProgressEvent>, String),
    Refuse(String),
    /// Stream opens, then never yields.
    Stall,
    /// The pull request itself never gets a response.
    NoResponse,
}

pub struct MockBackend {
    online: AtomicBool,
    online_after: AtomicUsize,
    hang_listing: AtomicBool,
    models: Mutex<Vec<ModelDescriptor>>,
    reply: Mutex<MockReply>,
    pull: Mutex<PullScript>,
    last_options: Mutex<Option<GenerationOptions>>,
    heartbeats: AtomicUsize,
    lists: AtomicUsize,
    chats: AtomicUsize,
    pulls: AtomicUsize,
}

pub fn descriptor(name: &str) -> ModelDescriptor {
    ModelDescriptor {
        name: name.to_string(),
        size: 4_661_224_676,
        parameter_size: Some("8.0B".to_string()),
        quantization_level: Some("Q4_0".to_string()),
        modified_at: None,
    }
}

pub fn progress(completed: u64, total: u64) -> ProgressEvent {
    ProgressEvent {
        status: "downloading".to_string(),
        digest: Some("sha256:layer".to_string()),
        completed: Some(completed),
        total: Some(total),
    }
}

impl MockBackend {
    fn with_online(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            online_after: AtomicUsize::new(0),
            hang_listing: AtomicBool::new(false),
            models: Mutex::new(Vec::new()),
            reply: Mutex::new(MockReply::Text("hi".to_string())),
            pull: Mutex::new(PullScript::Complete(vec![progress(10, 10)])),
            last_options: Mutex::new(None),
            heartbeats: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            chats: AtomicUsize::new(0),
            pulls: AtomicUsize::new(0),
        }
    }

    pub fn online() -> Self {
        Self::with_online(true)
    }

    pub fn offline() -> Self {
        Self::with_online(false)
    }

    pub fn with_models(self, names: &[&str]) -> Self {
        *self.models.lock() = names.iter().map(|n| descriptor(n)).collect();
        self
    }

    pub fn with_reply(self, reply: MockReply) -> Self {
        *self.reply.lock() = reply;
        self
    }

    pub fn with_pull(self, script: PullScript) -> Self {
        *self.pull.lock() = script;
        self
    }

    /// `list_models` never returns.
    pub fn with_hanging_listing(self) -> Self {
        self.hang_listing.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Offline until the `n`th heartbeat, which succeeds.
    pub fn come_online_after(&self, n: usize) {
        self.set_online(false);
        self.online_after.store(n, Ordering::SeqCst);
    }

    pub fn heartbeat_calls(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn chat_calls(&self) -> usize {
        self.chats.load(Ordering::SeqCst)
    }

    pub fn pull_calls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<GenerationOptions> {
        self.last_options.lock().clone()
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn unreachable() -> BackendError {
        BackendError::Unreachable(ENDPOINT.to_string())
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, BackendError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.hang_listing.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if !self.is_online() {
            return Err(Self::unreachable());
        }
        Ok(self.models.lock().clone())
    }

    async fn pull_model(&self, _name: &str) -> Result<ProgressStream, BackendError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        if !self.is_online() {
            return Err(Self::unreachable());
        }
        let script = self.pull.lock().clone();
        let stream: ProgressStream = match script {
            PullScript::Complete(events) => {
                futures_util::stream::iter(events.into_iter().map(Ok)).boxed()
            }
            PullScript::FailAfter(events, error) => futures_util::stream::iter(
                events
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(BackendError::PullFailed(error)))),
            )
            .boxed(),
            PullScript::Refuse(error) => return Err(BackendError::PullFailed(error)),
            PullScript::Stall => futures_util::stream::pending().boxed(),
            PullScript::NoResponse => return std::future::pending().await,
        };
        Ok(stream)
    }

    async fn chat(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<CompletionResult, BackendError> {
        self.chats.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock() = Some(options.clone());
        if !self.is_online() {
            return Err(Self::unreachable());
        }
        match self.reply.lock().clone() {
            MockReply::Text(text) => Ok(CompletionResult { text }),
            MockReply::Generation(error) => Err(BackendError::Generation(error)),
            MockReply::Unreachable => Err(Self::unreachable()),
        }
    }

    async fn show_model(&self, _name: &str) -> Result<ModelDetails, BackendError> {
        if !self.is_online() {
            return Err(Self::unreachable());
        }
        Ok(ModelDetails {
            parameters: Some("num_ctx 8192".to_string()),
            parameter_size: Some("8.0B".to_string()),
        })
    }

    async fn heartbeat(&self) -> Result<(), BackendError> {
        let n = self.heartbeats.fetch_add(1, Ordering::SeqCst) + 1;
        let after = self.online_after.load(Ordering::SeqCst);
        if after > 0 && n >= after {
            self.set_online(true);
        }
        if self.is_online() {
            Ok(())
        } else {
            Err(Self::unreachable())
        }
    }

    fn endpoint(&self) -> &str {
        ENDPOINT
    }
}

/// Process double that flips the mock backend online when spawned.
pub struct MockProcess {
    backend: Arc<MockBackend>,
    brings_backend_up: bool,
    fail_spawn: bool,
    alive: bool,
    pub spawns: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
}

impl MockProcess {
    pub fn new(backend: Arc<MockBackend>) -> Self {
        Self {
            backend,
            brings_backend_up: true,
            fail_spawn: false,
            alive: false,
            spawns: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn never_ready(mut self) -> Self {
        self.brings_backend_up = false;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_spawn = true;
        self
    }
}

impl ServerProcess for MockProcess {
    fn spawn(&mut self) -> Result<u32, BackendError> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        if self.fail_spawn {
            return Err(BackendError::Spawn("ollama: command not found".to_string()));
        }
        self.alive = true;
        if self.brings_backend_up {
            self.backend.set_online(true);
        }
        Ok(4242)
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.alive = false;
        self.backend.set_online(false);
    }

    fn is_alive(&mut self) -> bool {
        self.alive
    }
}
