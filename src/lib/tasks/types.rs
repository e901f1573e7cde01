use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Lifecycle of one supervised task. Running is the entry state; the other
/// three are terminal and have no outgoing transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Running,
    Finished,
    Failed,
    Killed,
}

/// One unit of work assigned by the orchestrator, backed by exactly one
/// container for its whole lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: TaskState,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub memory: Option<i64>,
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub force_pull: bool,
}

/// Envelope the orchestrator sends when dispatching a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub event_type: String,
    #[serde(default)]
    pub timestamp: Option<SystemTime>,
    pub task: Task,
}

/// First 12 characters of a runtime container id, the form the registry
/// keys its service entries by.
pub fn short_id(container_id: &str) -> &str {
    &container_id[..container_id.len().min(12)]
}
