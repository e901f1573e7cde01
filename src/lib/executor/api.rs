use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::info;

use crate::lib::executor::types::{Executor, ExecutorError, LifecycleHooks};
use crate::lib::tasks::types::{Task, TaskEvent, short_id};

/// HTTP surface the orchestrator's agent drives the executor through.
pub struct ExecutorServer {
    pub executor: Arc<Executor>,
    pub address: String,
}

/// Orchestrator lifecycle notification. None of these carry decisions; they
/// are logged and acknowledged.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    #[serde(default)]
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Registered,
    Reregistered,
    Disconnected,
    Message,
    Shutdown,
    Error,
}

pub fn router(executor: Arc<Executor>) -> Router {
    Router::new()
        .route("/tasks", get(ExecutorServer::get_tasks))
        .route("/tasks", post(ExecutorServer::launch_task))
        .route("/tasks/{id}", delete(ExecutorServer::kill_task))
        .route("/notifications", post(ExecutorServer::notify))
        .with_state(executor)
}

impl ExecutorServer {
    pub fn new(executor: Arc<Executor>, address: &str) -> Self {
        Self {
            executor,
            address: address.to_string(),
        }
    }

    async fn get_tasks(AxumState(executor): AxumState<Arc<Executor>>) -> Json<Vec<Task>> {
        Json(executor.snapshot().await)
    }

    async fn launch_task(
        AxumState(executor): AxumState<Arc<Executor>>,
        Json(event): Json<TaskEvent>,
    ) -> impl IntoResponse {
        info!(task_id = %event.task_id, event_type = %event.event_type, "task launch requested");

        match executor.launch(event.task).await {
            Ok(container_id) => (StatusCode::CREATED, short_id(&container_id).to_string()),
            Err(e @ ExecutorError::TaskAlreadyRunning) => {
                (StatusCode::CONFLICT, e.to_string())
            }
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    async fn kill_task(
        AxumState(executor): AxumState<Arc<Executor>>,
        Path(id): Path<String>,
    ) -> impl IntoResponse {
        match executor.kill(&id).await {
            Ok(state) => (StatusCode::OK, format!("task {id} reported {state:?}")),
            Err(e @ ExecutorError::NoSuchTask(_)) => (StatusCode::NOT_FOUND, e.to_string()),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    async fn notify(
        AxumState(executor): AxumState<Arc<Executor>>,
        Json(notification): Json<Notification>,
    ) -> StatusCode {
        match notification.kind {
            NotificationKind::Registered => executor.registered(&notification.detail),
            NotificationKind::Reregistered => executor.reregistered(&notification.detail),
            NotificationKind::Disconnected => executor.disconnected(),
            NotificationKind::Message => executor.framework_message(&notification.detail),
            NotificationKind::Shutdown => executor.shutdown_requested(),
            NotificationKind::Error => executor.error_message(&notification.detail),
        }

        StatusCode::OK
    }

    pub async fn start_server(self) -> std::io::Result<()> {
        info!(address = %self.address, "starting executor server");

        let app = router(self.executor);
        let listener = TcpListener::bind(&self.address).await?;
        axum::serve(listener, app).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::lib::executor::types::ExecutorConfig;
    use crate::lib::health::types::RegistryClient;
    use crate::lib::logs::types::LogSink;
    use crate::lib::status::types::StatusReporter;
    use crate::lib::tasks::docker::DockerManager;

    async fn serve_test_executor() -> String {
        let config = ExecutorConfig::default();
        let registry = RegistryClient::new(
            &config.registry_url,
            "host-a",
            1,
            Duration::from_millis(10),
            config.http_timeout,
        )
        .unwrap();
        let reporter = StatusReporter::new(&config.status_url, config.http_timeout).unwrap();
        let sink = Arc::new(
            LogSink::connect(&config.log_sink_addr, "web", "test")
                .await
                .unwrap(),
        );
        let executor = Arc::new(Executor::new(
            DockerManager::new().unwrap(),
            registry,
            reporter,
            sink,
            config,
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(executor)).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn snapshot_is_empty_before_any_launch() {
        let base = serve_test_executor().await;
        let tasks: Vec<Task> = reqwest::get(format!("{base}/tasks"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn kill_for_an_unknown_task_is_not_found() {
        let base = serve_test_executor().await;
        let resp = reqwest::Client::new()
            .delete(format!("{base}/tasks/task_1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn notifications_are_acknowledged() {
        let base = serve_test_executor().await;
        let client = reqwest::Client::new();

        for body in [
            r#"{"kind": "registered", "detail": "agent-7"}"#,
            r#"{"kind": "disconnected"}"#,
            r#"{"kind": "shutdown"}"#,
            r#"{"kind": "message", "detail": "ping"}"#,
        ] {
            let resp = client
                .post(format!("{base}/notifications"))
                .header("Content-Type", "application/json")
                .body(body)
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), reqwest::StatusCode::OK);
        }
    }

    #[test]
    fn notification_kinds_parse_from_wire_names() {
        let notification: Notification =
            serde_json::from_str(r#"{"kind": "reregistered", "detail": "agent-7"}"#).unwrap();
        assert_eq!(notification.kind, NotificationKind::Reregistered);
        assert_eq!(notification.detail, "agent-7");
    }
}
