use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::lib::health::types::RegistryClient;
use crate::lib::logs::types::LogSink;
use crate::lib::status::types::StatusReporter;
use crate::lib::tasks::docker::DockerManager;
use crate::lib::tasks::types::Task;

pub const KILL_TIMEOUT_SECS: i64 = 5;
pub const GRACE_DELAY: Duration = Duration::from_secs(1);
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(2);
pub const REGISTRY_RETRY_COUNT: u32 = 5;
pub const REGISTRY_RETRY_DELAY: Duration = Duration::from_secs(3);
// How long the service gets to register itself before health checking starts.
pub const HEALTH_BACKOFF: Duration = Duration::from_secs(60);
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(3);
pub const TASK_DUMP_PATH: &str = "/tmp/taskinfo.json";

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub listen_addr: String,
    pub status_url: String,
    pub registry_url: String,
    /// Hostname this task runs on, as the orchestrator names it. An empty
    /// host matches nothing in registry snapshots and therefore fails open.
    pub task_host: String,
    pub log_sink_addr: String,
    pub service_name: String,
    pub environment: String,
    pub kill_timeout_secs: i64,
    pub grace_delay: Duration,
    pub http_timeout: Duration,
    pub registry_attempts: u32,
    pub registry_retry_delay: Duration,
    pub health_backoff: Duration,
    pub health_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            listen_addr: "127.0.0.1:8080".to_string(),
            status_url: "http://localhost:5051/updates".to_string(),
            registry_url: "http://localhost:7777/state.json".to_string(),
            task_host: String::new(),
            log_sink_addr: "127.0.0.1:514".to_string(),
            service_name: "outrider".to_string(),
            environment: "dev".to_string(),
            kill_timeout_secs: KILL_TIMEOUT_SECS,
            grace_delay: GRACE_DELAY,
            http_timeout: HTTP_TIMEOUT,
            registry_attempts: REGISTRY_RETRY_COUNT,
            registry_retry_delay: REGISTRY_RETRY_DELAY,
            health_backoff: HEALTH_BACKOFF,
            health_interval: HEALTH_INTERVAL,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl ExecutorConfig {
    pub fn from_env() -> Self {
        let defaults = ExecutorConfig::default();

        ExecutorConfig {
            listen_addr: env_or("EXECUTOR_LISTEN", &defaults.listen_addr),
            status_url: env_or("STATUS_URL", &defaults.status_url),
            registry_url: env_or("REGISTRY_URL", &defaults.registry_url),
            task_host: env_or("TASK_HOST", &defaults.task_host),
            log_sink_addr: env_or("LOG_SINK_ADDR", &defaults.log_sink_addr),
            service_name: env_or("SERVICE_NAME", &defaults.service_name),
            environment: env_or("ENVIRONMENT", &defaults.environment),
            ..defaults
        }
    }
}

/// The one task this process supervises, plus its container handle once the
/// runtime has assigned one. Guarded by a single mutex; the task's own state
/// field is the state machine.
#[derive(Debug, Default)]
pub struct ExecState {
    pub task: Option<Task>,
    pub container_id: Option<String>,
}

#[derive(Clone)]
pub struct Executor {
    pub docker: DockerManager,
    pub registry: RegistryClient,
    pub reporter: StatusReporter,
    pub sink: Arc<LogSink>,
    pub config: ExecutorConfig,
    pub state: Arc<Mutex<ExecState>>,
    pub shutdown: CancellationToken,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("a task is already being supervised")]
    TaskAlreadyRunning,
    #[error("no supervised task with id {0}")]
    NoSuchTask(String),
    #[error("container runtime error: {0}")]
    Runtime(#[from] bollard::errors::Error),
}

/// Orchestrator lifecycle callbacks. Only launch, kill, and status updates
/// carry decision logic; everything else is notification-only and logs.
pub trait LifecycleHooks {
    fn registered(&self, detail: &str) {
        info!(detail, "registered with orchestrator");
    }

    fn reregistered(&self, detail: &str) {
        info!(detail, "re-registered with orchestrator");
    }

    fn disconnected(&self) {
        info!("orchestrator disconnected");
    }

    fn framework_message(&self, message: &str) {
        info!(message, "got framework message");
    }

    fn shutdown_requested(&self) {
        info!("shutting down the executor");
    }

    fn error_message(&self, message: &str) {
        info!(message, "got error message from orchestrator");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_local_collaborators() {
        let config = ExecutorConfig::default();
        assert_eq!(config.registry_url, "http://localhost:7777/state.json");
        assert_eq!(config.registry_attempts, 5);
        assert_eq!(config.kill_timeout_secs, 5);
        assert_eq!(config.grace_delay, Duration::from_secs(1));
        assert!(config.task_host.is_empty());
    }
}
