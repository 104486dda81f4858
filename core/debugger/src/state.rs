//! Tracker states and step predicates.

use crate::event::StopReason;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution state of a single render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackerState {
    /// Created, no trace event processed yet.
    Initialized,
    /// Rendering.
    Running,
    /// Parked at a checkpoint, waiting for a control command.
    Suspended,
    /// Forcibly stopped by a terminate request.
    Stopped,
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Running => write!(f, "running"),
            Self::Suspended => write!(f, "suspended"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Pending request to stop at a later checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// Stop at the next checkpoint, requested while running.
    Pause,
    /// Stop at the next checkpoint at any depth.
    In,
    /// Stop at the next checkpoint no deeper than `depth`.
    Over {
        /// Depth of the frame the step was requested from.
        depth: usize,
    },
}

impl StepMode {
    /// Whether a checkpoint at `depth` satisfies this request.
    #[must_use]
    pub fn matches(self, depth: usize) -> bool {
        match self {
            Self::Pause | Self::In => true,
            Self::Over { depth: target } => depth <= target,
        }
    }

    /// The reason reported when this request stops a render.
    #[must_use]
    pub fn reason(self) -> StopReason {
        match self {
            Self::Pause => StopReason::Pause,
            Self::In | Self::Over { .. } => StopReason::Step,
        }
    }
}
