use std::time::Duration;

use bollard::secret::ContainerSummary;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::lib::health::types::{HealthWatcher, RegistryClient, WatchError};
use crate::lib::tasks::docker::DockerManager;
use crate::lib::tasks::types::short_id;

pub fn container_listed(containers: &[ContainerSummary], container_id: &str) -> bool {
    containers
        .iter()
        .any(|entry| entry.id.as_deref() == Some(container_id))
}

impl HealthWatcher {
    pub fn new(
        docker: DockerManager,
        registry: RegistryClient,
        container_id: &str,
        backoff: Duration,
        interval: Duration,
    ) -> Self {
        HealthWatcher {
            docker,
            registry,
            container_id: container_id.to_string(),
            backoff,
            interval,
        }
    }

    /// Run until the container stops being healthy or the token fires. The
    /// initial backoff gives the service time to register itself before the
    /// first verdict is taken. Retries against the registry live inside the
    /// client; an error surfacing here is authoritative.
    pub async fn watch(&self, shutdown: CancellationToken) -> Result<(), WatchError> {
        info!(
            container = short_id(&self.container_id),
            backoff_secs = self.backoff.as_secs(),
            "watching container"
        );

        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = tokio::time::sleep(self.backoff) => {}
        }

        loop {
            let containers = self.docker.list().await?;
            if !container_listed(&containers, &self.container_id) {
                return Err(WatchError::NotRunning {
                    container_id: self.container_id.clone(),
                });
            }

            self.registry.check(&self.container_id).await?;
            debug!(container = short_id(&self.container_id), "container healthy");

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str) -> ContainerSummary {
        ContainerSummary {
            id: Some(id.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn finds_container_in_listing() {
        let containers = vec![summary("aaa"), summary("bbb"), summary("ccc")];
        assert!(container_listed(&containers, "bbb"));
    }

    #[test]
    fn missing_container_is_not_listed() {
        let containers = vec![summary("aaa"), summary("ccc")];
        assert!(!container_listed(&containers, "bbb"));
        assert!(!container_listed(&[], "bbb"));
    }

    #[test]
    fn entries_without_ids_do_not_match() {
        let containers = vec![ContainerSummary::default()];
        assert!(!container_listed(&containers, "bbb"));
    }

    #[tokio::test]
    async fn cancelled_watcher_exits_cleanly_before_first_check() {
        let docker = DockerManager::new().unwrap();
        let registry = RegistryClient::new(
            "http://localhost:7777/state.json",
            "host-a",
            1,
            Duration::from_millis(10),
            Duration::from_millis(100),
        )
        .unwrap();
        let watcher = HealthWatcher::new(
            docker,
            registry,
            "abc123456789",
            Duration::from_secs(60),
            Duration::from_secs(3),
        );

        let shutdown = CancellationToken::new();
        shutdown.cancel();

        assert!(watcher.watch(shutdown).await.is_ok());
    }
}
