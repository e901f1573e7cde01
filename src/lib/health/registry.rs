use std::time::Duration;

use tracing::{error, info, warn};

use crate::lib::health::types::{RegistryClient, RegistryError, RegistryState};
use crate::lib::tasks::types::short_id;

impl RegistryClient {
    pub fn new(
        url: &str,
        task_host: &str,
        attempts: u32,
        retry_delay: Duration,
        http_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(http_timeout).build()?;

        Ok(RegistryClient {
            client,
            url: url.to_string(),
            task_host: task_host.to_string(),
            attempts,
            retry_delay,
        })
    }

    async fn fetch(&self) -> Result<String, reqwest::Error> {
        self.client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }

    /// One poll of the registry for the given container. Every unverifiable
    /// condition fails open: transport errors, bad bodies, and snapshots
    /// missing this host or service are logged and treated as healthy. The
    /// only error returned is an explicit unhealthy/tombstone verdict for
    /// exactly this host and container.
    pub async fn check(&self, container_id: &str) -> Result<(), RegistryError> {
        let mut body = None;
        for attempt in 1..=self.attempts {
            match self.fetch().await {
                Ok(text) => {
                    body = Some(text);
                    break;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "registry fetch failed");
                    if attempt < self.attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        // A registry outage must never cascade into killing the workloads
        // that keep the cluster running, the registry's own deployments
        // included.
        let Some(body) = body else {
            error!(url = %self.url, "can't contact registry, assuming healthy");
            return Ok(());
        };

        let state: RegistryState = match serde_json::from_str(&body) {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "can't parse registry state, assuming healthy");
                return Ok(());
            }
        };

        let Some(server) = state.servers.get(&self.task_host) else {
            error!(host = %self.task_host, "host not in registry state, assuming healthy");
            return Ok(());
        };

        let service_id = short_id(container_id);
        let Some(service) = server.services.get(service_id) else {
            info!(container = service_id, "service not registered yet, assuming healthy");
            return Ok(());
        };

        if service.status.is_failing() {
            return Err(RegistryError::Unhealthy {
                container_id: container_id.to_string(),
                status: service.status,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{Router, http::StatusCode, routing::get};

    use super::*;

    const CONTAINER_ID: &str = "abc123456789deadbeef";

    fn client(url: &str, host: &str) -> RegistryClient {
        RegistryClient::new(
            url,
            host,
            2,
            Duration::from_millis(10),
            Duration::from_millis(500),
        )
        .unwrap()
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/state.json")
    }

    async fn serve_body(body: &'static str) -> String {
        serve(Router::new().route("/state.json", get(move || async move { body }))).await
    }

    #[tokio::test]
    async fn unreachable_registry_fails_open() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let registry = client(&format!("http://{addr}/state.json"), "host-a");
        assert!(registry.check(CONTAINER_ID).await.is_ok());
    }

    #[tokio::test]
    async fn server_errors_consume_every_attempt_then_fail_open() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/state.json",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        );

        let registry = client(&serve(app).await, "host-a");
        assert!(registry.check(CONTAINER_ID).await.is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unparseable_body_fails_open() {
        let registry = client(&serve_body("not json at all").await, "host-a");
        assert!(registry.check(CONTAINER_ID).await.is_ok());
    }

    #[tokio::test]
    async fn missing_host_fails_open() {
        let body = r#"{"host-b": {"Services": {"abc123456789": {"Status": "unhealthy"}}}}"#;
        let registry = client(&serve_body(body).await, "host-a");
        assert!(registry.check(CONTAINER_ID).await.is_ok());
    }

    #[tokio::test]
    async fn missing_service_fails_open() {
        let body = r#"{"host-a": {"Services": {"fff000000000": {"Status": "unhealthy"}}}}"#;
        let registry = client(&serve_body(body).await, "host-a");
        assert!(registry.check(CONTAINER_ID).await.is_ok());
    }

    #[tokio::test]
    async fn unhealthy_service_on_this_host_fails_the_check() {
        let body = r#"{"host-a": {"Services": {"abc123456789": {"Status": "unhealthy"}}}}"#;
        let registry = client(&serve_body(body).await, "host-a");

        let err = registry.check(CONTAINER_ID).await.unwrap_err();
        let RegistryError::Unhealthy { container_id, status } = err;
        assert_eq!(container_id, CONTAINER_ID);
        assert_eq!(status, crate::lib::health::types::ServiceStatus::Unhealthy);
    }

    #[tokio::test]
    async fn tombstoned_service_fails_the_check() {
        let body = r#"{"host-a": {"Services": {"abc123456789": {"Status": "tombstone"}}}}"#;
        let registry = client(&serve_body(body).await, "host-a");
        assert!(registry.check(CONTAINER_ID).await.is_err());
    }

    #[tokio::test]
    async fn healthy_service_passes() {
        let body = r#"{"host-a": {"Services": {"abc123456789": {"Status": "healthy"}}}}"#;
        let registry = client(&serve_body(body).await, "host-a");
        assert!(registry.check(CONTAINER_ID).await.is_ok());
    }
}
