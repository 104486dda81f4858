//! Session configuration.

use crate::session::DebugSession;
use serde::{Deserialize, Serialize};

/// Tunables of a [`DebugSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Resume every suspended render when the last listener is removed.
    ///
    /// Without an observer nobody could ever resume them.
    pub release_when_unobserved: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            release_when_unobserved: true,
        }
    }
}

/// Builder for [`DebugSession`].
///
/// # Example
///
/// ```
/// use qute_debug::DebugSession;
///
/// let session = DebugSession::builder()
///     .release_when_unobserved(false)
///     .build();
/// assert!(!session.config().release_when_unobserved);
/// ```
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct DebugSessionBuilder {
    config: SessionConfig,
}

impl DebugSessionBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration, e.g. one deserialized from a
    /// launch request.
    pub fn with_config(config: SessionConfig) -> Self {
        Self { config }
    }

    /// See [`SessionConfig::release_when_unobserved`].
    pub fn release_when_unobserved(mut self, release: bool) -> Self {
        self.config.release_when_unobserved = release;
        self
    }

    /// Builds the session.
    pub fn build(self) -> DebugSession {
        DebugSession::with_config(self.config)
    }
}
