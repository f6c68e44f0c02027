use serde::Serialize;
use std::fmt;

/// Lifecycle states of a task, in the order they are reached.
///
/// `Ready` and `Active` alternate through suspend/start; every other
/// transition moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Constructed,
    Initializing,
    Ready,
    Active,
    Finishing,
    Finished,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constructed => "CONSTRUCTED",
            Self::Initializing => "INITIALIZING",
            Self::Ready => "READY",
            Self::Active => "ACTIVE",
            Self::Finishing => "FINISHING",
            Self::Finished => "FINISHED",
        }
    }

    /// True once kill has been requested or completed
    pub fn is_terminating(&self) -> bool {
        matches!(self, Self::Finishing | Self::Finished)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_ordered_by_lifecycle() {
        assert!(TaskState::Constructed < TaskState::Ready);
        assert!(TaskState::Active < TaskState::Finishing);
        assert!(TaskState::Finishing.is_terminating());
        assert!(!TaskState::Active.is_terminating());
        assert_eq!(TaskState::Ready.to_string(), "READY");
    }
}
