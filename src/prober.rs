use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::ModelBackend;

/// Liveness checks against the model backend.
#[derive(Clone)]
pub struct ReadinessProber {
    backend: Arc<dyn ModelBackend>,
}

impl ReadinessProber {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    /// Single check, no retry. Any error counts as "not ready".
    pub async fn probe(&self) -> bool {
        match self.backend.heartbeat().await {
            Ok(()) => true,
            Err(e) => {
                debug!(endpoint = %self.backend.endpoint(), error = %e, "backend probe failed");
                false
            }
        }
    }

    /// Probe up to `max_attempts` times, sleeping `interval` between attempts.
    ///
    /// Returns on the first successful probe.
    pub async fn wait_until_ready(&self, max_attempts: u32, interval: Duration) -> bool {
        info!(
            endpoint = %self.backend.endpoint(),
            max_attempts,
            "waiting for model backend to become ready"
        );

        for attempt in 1..=max_attempts {
            if self.probe().await {
                info!(attempt, "model backend is ready");
                return true;
            }
            if attempt < max_attempts {
                tokio::time::sleep(interval).await;
            }
        }

        warn!(max_attempts, "model backend did not become ready");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    fn prober(backend: &Arc<MockBackend>) -> ReadinessProber {
        ReadinessProber::new(backend.clone())
    }

    #[tokio::test]
    async fn test_probe_swallows_errors() {
        let backend = Arc::new(MockBackend::offline());
        assert!(!prober(&backend).probe().await);
        assert_eq!(backend.heartbeat_calls(), 1);
    }

    #[tokio::test]
    async fn test_wait_gives_up_after_max_attempts() {
        let backend = Arc::new(MockBackend::offline());
        let ready = prober(&backend)
            .wait_until_ready(4, Duration::from_millis(1))
            .await;
        assert!(!ready);
        assert_eq!(backend.heartbeat_calls(), 4);
    }

    #[tokio::test]
    async fn test_wait_stops_at_first_success() {
        let backend = Arc::new(MockBackend::online());
        backend.come_online_after(3);

        let ready = prober(&backend)
            .wait_until_ready(10, Duration::from_millis(1))
            .await;
        assert!(ready);
        assert_eq!(backend.heartbeat_calls(), 3);
    }

    #[tokio::test]
    async fn test_wait_with_zero_attempts() {
        let backend = Arc::new(MockBackend::online());
        let ready = prober(&backend)
            .wait_until_ready(0, Duration::from_millis(1))
            .await;
        assert!(!ready);
        assert_eq!(backend.heartbeat_calls(), 0);
    }
}
