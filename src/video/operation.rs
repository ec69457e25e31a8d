//! Long-running operation state.

use crate::video::types::VideoPayload;
use serde::Serialize;

/// Opaque handle returned by a submission (the remote operation name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationHandle(String);

impl OperationHandle {
    /// Wraps a remote operation name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The remote operation name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    /// Submitted, not yet observed.
    Pending,
    /// Observed as not done.
    Running,
    /// Finished with a video.
    Succeeded,
    /// Finished with an error.
    Failed,
}

impl OperationState {
    /// SUCCEEDED and FAILED admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed => 2,
        }
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// One status report from the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    /// Reported state.
    pub state: OperationState,
    /// Video reference, present when `state` is SUCCEEDED.
    pub payload: Option<VideoPayload>,
    /// Remote error message, present when `state` is FAILED.
    pub error: Option<String>,
}

impl OperationStatus {
    /// Still in progress.
    pub fn running() -> Self {
        Self {
            state: OperationState::Running,
            payload: None,
            error: None,
        }
    }

    /// Finished with a video.
    pub fn succeeded(payload: VideoPayload) -> Self {
        Self {
            state: OperationState::Succeeded,
            payload: Some(payload),
            error: None,
        }
    }

    /// Finished with an error message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: OperationState::Failed,
            payload: None,
            error: Some(message.into()),
        }
    }
}

/// Local view of a remote operation.
///
/// Mutated only through [`Operation::apply`], which enforces
/// PENDING → RUNNING → {SUCCEEDED | FAILED}.
#[derive(Debug, Clone)]
pub struct Operation {
    handle: OperationHandle,
    state: OperationState,
    payload: Option<VideoPayload>,
    error: Option<String>,
    history: Vec<OperationState>,
}

impl Operation {
    /// A freshly submitted operation.
    pub fn new(handle: OperationHandle) -> Self {
        Self {
            handle,
            state: OperationState::Pending,
            payload: None,
            error: None,
            history: vec![OperationState::Pending],
        }
    }

    /// The remote handle.
    pub fn handle(&self) -> &OperationHandle {
        &self.handle
    }

    /// Current state.
    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Video reference once SUCCEEDED.
    pub fn payload(&self) -> Option<&VideoPayload> {
        self.payload.as_ref()
    }

    /// Remote error once FAILED.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Every distinct state observed, in order.
    pub fn history(&self) -> &[OperationState] {
        &self.history
    }

    /// Moves the payload out of a succeeded operation.
    pub fn take_payload(&mut self) -> Option<VideoPayload> {
        self.payload.take()
    }

    /// Applies a status report. Returns whether the state changed.
    ///
    /// Reports that would move backwards, or arrive after a terminal state,
    /// are ignored.
    pub fn apply(&mut self, status: OperationStatus) -> bool {
        if self.state.is_terminal() {
            tracing::debug!(
                operation = %self.handle,
                current = %self.state,
                reported = %status.state,
                "ignoring status after terminal state"
            );
            return false;
        }
        if status.state.rank() < self.state.rank() {
            tracing::debug!(
                operation = %self.handle,
                current = %self.state,
                reported = %status.state,
                "ignoring out-of-order status"
            );
            return false;
        }
        if status.state == self.state {
            return false;
        }

        self.state = status.state;
        self.history.push(status.state);
        match status.state {
            OperationState::Succeeded => self.payload = status.payload,
            OperationState::Failed => {
                self.error = Some(
                    status
                        .error
                        .unwrap_or_else(|| "unknown error".to_string()),
                )
            }
            OperationState::Pending | OperationState::Running => {}
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OperationState::*;

    fn op() -> Operation {
        Operation::new(OperationHandle::new("operations/123"))
    }

    #[test]
    fn test_new_operation_is_pending() {
        let op = op();
        assert_eq!(op.state(), Pending);
        assert_eq!(op.history(), &[Pending]);
        assert!(op.payload().is_none());
    }

    #[test]
    fn test_happy_path_history() {
        let mut op = op();
        assert!(op.apply(OperationStatus::running()));
        assert!(!op.apply(OperationStatus::running()));
        assert!(op.apply(OperationStatus::succeeded(VideoPayload::Inline(vec![1, 2]))));
        assert_eq!(op.history(), &[Pending, Running, Succeeded]);
        assert_eq!(op.payload(), Some(&VideoPayload::Inline(vec![1, 2])));
    }

    #[test]
    fn test_pending_can_jump_to_terminal() {
        let mut op = op();
        assert!(op.apply(OperationStatus::failed("quota exceeded")));
        assert_eq!(op.history(), &[Pending, Failed]);
        assert_eq!(op.error(), Some("quota exceeded"));
    }

    #[test]
    fn test_terminal_states_are_never_left() {
        let mut op = op();
        op.apply(OperationStatus::succeeded(VideoPayload::Remote("gs://b/v.mp4".into())));
        assert!(!op.apply(OperationStatus::running()));
        assert!(!op.apply(OperationStatus::failed("late failure")));
        assert_eq!(op.state(), Succeeded);
        assert!(op.error().is_none());
        assert_eq!(op.history(), &[Pending, Succeeded]);
    }

    #[test]
    fn test_regression_to_pending_is_ignored() {
        let mut op = op();
        op.apply(OperationStatus::running());
        let pending = OperationStatus {
            state: Pending,
            payload: None,
            error: None,
        };
        assert!(!op.apply(pending));
        assert_eq!(op.state(), Running);
    }

    #[test]
    fn test_failed_without_message() {
        let mut op = op();
        op.apply(OperationStatus {
            state: Failed,
            payload: None,
            error: None,
        });
        assert_eq!(op.error(), Some("unknown error"));
    }

    #[test]
    fn test_state_display_and_terminality() {
        assert_eq!(Running.to_string(), "RUNNING");
        assert!(Succeeded.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Pending.is_terminal());
        assert!(!Running.is_terminal());
    }
}
