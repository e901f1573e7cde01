use std::collections::HashMap;

use super::types::TaskState;

pub fn valid_state_transition(src: &TaskState, dst: &TaskState) -> bool {
    let state_transition_map: HashMap<TaskState, Vec<TaskState>> = {
        let mut map = HashMap::new();
        map.insert(
            TaskState::Running,
            vec![TaskState::Finished, TaskState::Failed, TaskState::Killed],
        );
        map.insert(TaskState::Finished, vec![]);
        map.insert(TaskState::Failed, vec![]);
        map.insert(TaskState::Killed, vec![]);
        map
    };

    if let Some(valid_states) = state_transition_map.get(src) {
        valid_states.contains(dst)
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_reaches_every_terminal_state() {
        for dst in [TaskState::Finished, TaskState::Failed, TaskState::Killed] {
            assert!(valid_state_transition(&TaskState::Running, &dst));
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for src in [TaskState::Finished, TaskState::Failed, TaskState::Killed] {
            for dst in [
                TaskState::Running,
                TaskState::Finished,
                TaskState::Failed,
                TaskState::Killed,
            ] {
                assert!(!valid_state_transition(&src, &dst));
            }
        }
    }

    #[test]
    fn running_does_not_rereport_running() {
        assert!(!valid_state_transition(&TaskState::Running, &TaskState::Running));
    }
}
