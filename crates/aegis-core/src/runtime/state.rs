//! Runtime state machine (spec §4.6): `INITIALIZED → STARTING → STARTED →
//! STOPPING → STOPPED`, with a `FAILED` branch off every step. Grounded
//! on the teacher's `kernel::model::State<T>`/`Status` split: a typed
//! enum carrying an `Arc<CoreError>` on failure rather than a bare string,
//! so callers can match on error category without re-parsing messages.

use std::fmt;
use std::sync::Arc;

use crate::error::CoreError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeState {
    Initialized,
    Starting,
    Started,
    Stopping,
    Stopped,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RuntimeState::Initialized => "INITIALIZED",
            RuntimeState::Starting => "STARTING",
            RuntimeState::Started => "STARTED",
            RuntimeState::Stopping => "STOPPING",
            RuntimeState::Stopped => "STOPPED",
        };
        f.write_str(label)
    }
}

/// Either an operational [`RuntimeState`] or the terminal failure branch.
/// Once `Failed`, the runtime is not reusable (spec §4.6: "once in
/// STOPPED or FAILED the runtime is not reusable").
#[derive(Clone, Debug)]
pub enum RuntimeStatus {
    Running(RuntimeState),
    Failed(Arc<CoreError>),
}

impl RuntimeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RuntimeStatus::Failed(_) | RuntimeStatus::Running(RuntimeState::Stopped)
        )
    }

    pub fn is_operational(&self) -> bool {
        matches!(self, RuntimeStatus::Running(RuntimeState::Started))
    }

    pub fn as_running(&self) -> Option<&RuntimeState> {
        match self {
            RuntimeStatus::Running(state) => Some(state),
            RuntimeStatus::Failed(_) => None,
        }
    }
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeStatus::Running(state) => write!(f, "{state}"),
            RuntimeStatus::Failed(err) => write!(f, "FAILED: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_and_failed_are_terminal() {
        assert!(RuntimeStatus::Running(RuntimeState::Stopped).is_terminal());
        assert!(RuntimeStatus::Failed(Arc::new(CoreError::new("X", "y"))).is_terminal());
        assert!(!RuntimeStatus::Running(RuntimeState::Started).is_terminal());
    }
}
