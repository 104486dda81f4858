//! Error types for debugger operations.

use crate::{state::TrackerState, tracker::TrackerId};
use thiserror::Error;

/// Result type for debugger operations.
pub type DebugResult<T> = Result<T, DebugError>;

/// Result type for protocol requests.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors surfaced to the caller of a control command.
///
/// Commands against a tracker that no longer exists are not errors: the
/// render may have finished before the command arrived, so those are no-ops.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebugError {
    /// The command is not legal in the tracker's current state.
    #[error("cannot {operation} tracker {tracker} while it is {state}")]
    InvalidState {
        /// The tracker the command was sent to.
        tracker: TrackerId,
        /// The rejected command.
        operation: &'static str,
        /// The state the tracker was in.
        state: TrackerState,
    },
}

impl DebugError {
    pub(crate) fn invalid_state(
        tracker: TrackerId,
        operation: &'static str,
        state: TrackerState,
    ) -> Self {
        Self::InvalidState {
            tracker,
            operation,
            state,
        }
    }
}

/// Errors turning a protocol request into a session call.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The command name is not supported.
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    /// The request arguments do not match the command.
    #[error("invalid arguments: {0}")]
    InvalidArguments(#[source] serde_json::Error),
    /// A response body could not be encoded.
    #[error("failed to serialize response: {0}")]
    Serialize(#[source] serde_json::Error),
    /// A breakpoint request named no template.
    #[error("source has neither a path nor a name")]
    MissingSource,
    /// A line number outside the template.
    #[error("invalid line number {0}")]
    InvalidLine(i64),
    /// The session rejected the command.
    #[error(transparent)]
    Debug(#[from] DebugError),
}
