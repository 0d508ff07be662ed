//! Loop state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of the cycle loop.
///
/// STOPPED -> RUNNING (start), RUNNING -> PAUSED (pause),
/// PAUSED -> RUNNING (resume), RUNNING|PAUSED -> STOPPED (stop).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl LoopState {
    /// Whether moving to `to` is a legal transition.
    pub fn can_transition_to(self, to: LoopState) -> bool {
        matches!(
            (self, to),
            (LoopState::Stopped, LoopState::Running)
                | (LoopState::Running, LoopState::Paused)
                | (LoopState::Paused, LoopState::Running)
                | (LoopState::Running, LoopState::Stopped)
                | (LoopState::Paused, LoopState::Stopped)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Stopped => "STOPPED",
            LoopState::Running => "RUNNING",
            LoopState::Paused => "PAUSED",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use LoopState::*;
        let all = [Stopped, Running, Paused];
        let legal = [(Stopped, Running), (Running, Paused), (Paused, Running), (Running, Stopped), (Paused, Stopped)];
        for from in all {
            for to in all {
                assert_eq!(from.can_transition_to(to), legal.contains(&(from, to)), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_default_is_stopped() {
        assert_eq!(LoopState::default(), LoopState::Stopped);
        assert_eq!(serde_json::to_string(&LoopState::Paused).unwrap(), "\"PAUSED\"");
    }
}
