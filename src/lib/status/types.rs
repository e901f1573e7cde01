use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lib::tasks::types::TaskState;

/// One state transition on the orchestrator wire. States travel as the
/// orchestrator's numeric enumeration, not as our names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub update_id: Uuid,
    pub task_id: String,
    pub state: u8,
}

pub fn wire_state(state: &TaskState) -> u8 {
    match state {
        TaskState::Running => 0,
        TaskState::Finished => 1,
        TaskState::Failed => 2,
        TaskState::Killed => 3,
    }
}

/// Sends task-state transitions to the orchestrator. Delivery is
/// fire-and-forget, which is why terminal reports are followed by a grace
/// delay before the process exits.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    pub client: reqwest::Client,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_states_match_the_orchestrator_enumeration() {
        assert_eq!(wire_state(&TaskState::Running), 0);
        assert_eq!(wire_state(&TaskState::Finished), 1);
        assert_eq!(wire_state(&TaskState::Failed), 2);
        assert_eq!(wire_state(&TaskState::Killed), 3);
    }

    #[test]
    fn update_serializes_task_id_and_state() {
        let update = StatusUpdate {
            update_id: Uuid::new_v4(),
            task_id: "task_7".to_string(),
            state: wire_state(&TaskState::Failed),
        };

        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&update).unwrap()).unwrap();
        assert_eq!(value["task_id"], "task_7");
        assert_eq!(value["state"], 2);
    }
}
