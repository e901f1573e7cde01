use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::lib::tasks::docker::DockerManager;

/// Point-in-time health snapshot published by the registry, keyed by
/// hostname, then by short container id. Parsed fresh on every poll and
/// discarded after one watcher iteration.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct RegistryState {
    pub servers: HashMap<String, ServerEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    #[serde(rename = "Services")]
    pub services: HashMap<String, ServiceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceEntry {
    #[serde(rename = "Status")]
    pub status: ServiceStatus,
}

/// Registry-reported service status. Anything the registry says that we do
/// not recognize lands on Unknown and counts as healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
    Tombstone,
    #[serde(other)]
    Unknown,
}

impl ServiceStatus {
    /// The one condition that may take a task down: the registry explicitly
    /// marks the service unhealthy or retired.
    pub fn is_failing(&self) -> bool {
        matches!(self, ServiceStatus::Unhealthy | ServiceStatus::Tombstone)
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unhealthy container {container_id}: registry reports {status:?}, failing task")]
    Unhealthy {
        container_id: String,
        status: ServiceStatus,
    },
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("container {container_id} not running")]
    NotRunning { container_id: String },
    #[error(transparent)]
    Unhealthy(#[from] RegistryError),
    #[error("container runtime error: {0}")]
    Runtime(#[from] bollard::errors::Error),
}

/// Client for the registry's HTTP state endpoint. Stateless across polls;
/// the retry counter lives inside one check call.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    pub client: reqwest::Client,
    pub url: String,
    pub task_host: String,
    pub attempts: u32,
    pub retry_delay: Duration,
}

/// Periodic control loop confirming one container is both alive per the
/// runtime and not flagged by the registry.
#[derive(Debug, Clone)]
pub struct HealthWatcher {
    pub docker: DockerManager,
    pub registry: RegistryClient,
    pub container_id: String,
    pub backoff: Duration,
    pub interval: Duration,
}
