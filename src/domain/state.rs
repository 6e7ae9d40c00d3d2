use serde::Serialize;

/// Phase of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WatcherState {
    Idle,
    Polling,
}

impl WatcherState {
    pub fn can_transition(self, next: WatcherState) -> bool {
        // a cycle always returns to Idle, whatever happened while polling
        matches!(
            (self, next),
            (WatcherState::Idle, WatcherState::Polling) | (WatcherState::Polling, WatcherState::Idle)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_alternating_transitions_are_allowed() {
        assert!(WatcherState::Idle.can_transition(WatcherState::Polling));
        assert!(WatcherState::Polling.can_transition(WatcherState::Idle));
        assert!(!WatcherState::Idle.can_transition(WatcherState::Idle));
        assert!(!WatcherState::Polling.can_transition(WatcherState::Polling));
    }
}
