//! Protocol message types
//!
//! This module defines the request arguments, response bodies and event
//! bodies exchanged with a client.

use crate::{state::TrackerState, tracker::TrackerId};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request Arguments
// ============================================================================

/// Arguments of `setBreakpoints`, which replaces every breakpoint of a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    /// The source whose breakpoints are replaced.
    pub source: Source,
    /// Requested breakpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakpoints: Option<Vec<SourceBreakpoint>>,
    /// Requested lines, the older form of `breakpoints`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<i64>>,
}

/// A requested breakpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    /// 1-based line.
    pub line: i64,
}

/// Arguments of every command addressed to one render: `state`, `pause`,
/// `continue`, `next`, `stepIn` and `stepOut`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadArguments {
    /// The render addressed.
    pub thread_id: TrackerId,
}

/// Arguments of `stackTrace`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    /// The render addressed.
    pub thread_id: TrackerId,
    /// Index of the first frame returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_frame: Option<usize>,
    /// Maximum number of frames, `0` or absent for all of them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<usize>,
}

/// Arguments of `scopes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArguments {
    /// A frame id from a previous `stackTrace`.
    pub frame_id: i64,
}

/// Arguments of `variables`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    /// A reference from a previous `scopes`.
    pub variables_reference: i64,
}

// ============================================================================
// Response Bodies
// ============================================================================

/// Body of the `setBreakpoints` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsResponseBody {
    /// One entry per requested breakpoint, in request order.
    pub breakpoints: Vec<Breakpoint>,
}

/// Body of the `threads` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadsResponseBody {
    /// Every live render.
    pub threads: Vec<Thread>,
}

/// Body of the `state` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponseBody {
    /// `None` once the render is gone.
    pub state: Option<TrackerState>,
}

/// Body of the `continue` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueResponseBody {
    /// Always `false`, renders are resumed one at a time.
    #[serde(default)]
    pub all_threads_continued: bool,
}

/// Body of the `stackTrace` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponseBody {
    /// The requested window of frames, most recent first.
    pub stack_frames: Vec<StackFrame>,
    /// Number of frames before windowing.
    pub total_frames: usize,
}

/// Body of the `scopes` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesResponseBody {
    /// Scopes of the frame.
    pub scopes: Vec<Scope>,
}

/// Body of the `variables` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesResponseBody {
    /// Variables of the scope.
    pub variables: Vec<Variable>,
}

// ============================================================================
// Types
// ============================================================================

/// A template as the client sees it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The template id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Source {
    /// A source naming a template.
    #[must_use]
    pub fn template(template_id: &str) -> Self {
        Self {
            name: None,
            path: Some(template_id.to_string()),
        }
    }

    /// The template id, taken from the path, else the name.
    #[must_use]
    pub fn template_id(&self) -> Option<&str> {
        self.path.as_deref().or(self.name.as_deref())
    }
}

/// A breakpoint as reported back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    /// Whether the breakpoint was set.
    pub verified: bool,
    /// The source it was set in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// 1-based line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
}

/// One frame of a stack trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Frame id, valid for `scopes`.
    pub id: i64,
    /// Description of the resolved node.
    pub name: String,
    /// The template of the frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// 1-based line.
    pub line: i64,
    /// Always 0.
    pub column: i64,
}

/// A named group of variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    /// Display name.
    pub name: String,
    /// Presentation hint for the client, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_hint: Option<String>,
    /// Reference valid for `variables`.
    pub variables_reference: i64,
    /// Whether fetching the variables is costly.
    pub expensive: bool,
}

/// A variable and its rendered value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Variable name.
    pub name: String,
    /// Rendered value.
    pub value: String,
    /// Type name of the value.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Always 0, values are not expandable.
    pub variables_reference: i64,
}

/// A render, shown to the client as a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Tracker id of the render.
    pub id: TrackerId,
    /// Display name.
    pub name: String,
}

// ============================================================================
// Event Bodies
// ============================================================================

/// Body of the `stopped` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    /// Why the render stopped.
    pub reason: String,
    /// The render that stopped.
    pub thread_id: TrackerId,
    /// Always `false`, other renders keep running.
    #[serde(default)]
    pub all_threads_stopped: bool,
}

/// Body of the `thread` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadEventBody {
    /// `started` or `exited`.
    pub reason: String,
    /// The render concerned.
    pub thread_id: TrackerId,
}

/// Body of the `terminated` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminatedEventBody {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_prefers_the_path_over_the_name() {
        let source = Source::template("page.html");
        assert_eq!(source.template_id(), Some("page.html"));
        assert_eq!(
            serde_json::to_value(&source).expect("encodable"),
            json!({ "path": "page.html" })
        );

        let named: Source =
            serde_json::from_value(json!({ "name": "row.html" })).expect("decodable");
        assert_eq!(named.template_id(), Some("row.html"));
        assert_eq!(Source::default().template_id(), None);
    }
}
