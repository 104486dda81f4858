//! Stack frames, scopes and variables.
//!
//! Frames are immutable snapshots of a render position. Their scopes, and the
//! variables of each scope, are computed on first access and cached for the
//! lifetime of the frame.

use crate::trace::{RenderContext, ResolveEvent};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fmt, iter,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

/// Unique identifier for a stack frame within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub i64);

/// Handle a client uses to list the variables of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariablesReference(pub i64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VariablesReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session-owned id allocators.
///
/// Both counters start at 1, `0` means "no reference" in the debug adapter
/// protocol.
#[derive(Debug)]
pub(crate) struct Ids {
    frames: AtomicI64,
    variables: AtomicI64,
}

impl Default for Ids {
    fn default() -> Self {
        Self {
            frames: AtomicI64::new(1),
            variables: AtomicI64::new(1),
        }
    }
}

impl Ids {
    pub(crate) fn next_frame(&self) -> FrameId {
        FrameId(self.frames.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn next_variables(&self) -> VariablesReference {
        VariablesReference(self.variables.fetch_add(1, Ordering::Relaxed))
    }
}

/// A position reached by a render.
pub struct StackFrame {
    id: FrameId,
    name: String,
    template_id: String,
    line: u32,
    depth: usize,
    previous: Option<Arc<StackFrame>>,
    context: Arc<dyn RenderContext>,
    scopes: OnceCell<Vec<Arc<Scope>>>,
}

impl StackFrame {
    pub(crate) fn new(
        id: FrameId,
        event: &ResolveEvent<'_>,
        depth: usize,
        previous: Option<Arc<StackFrame>>,
    ) -> Self {
        let name = if event.description.is_empty() {
            format!("{}:{}", event.template_id, event.line)
        } else {
            event.description.to_string()
        };
        Self {
            id,
            name,
            template_id: event.template_id.to_string(),
            line: event.line,
            depth,
            previous,
            context: Arc::clone(&event.context),
            scopes: OnceCell::new(),
        }
    }

    /// The frame id.
    #[must_use]
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Display name, the node description.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Template the node belongs to.
    #[must_use]
    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    /// Line of the node.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Template nesting depth of the render when this frame was pushed.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The frame that was on top of the stack before this one.
    #[must_use]
    pub fn previous(&self) -> Option<&Arc<StackFrame>> {
        self.previous.as_ref()
    }

    /// Whether `other` is at the same template position.
    #[must_use]
    pub fn same_position(&self, other: &StackFrame) -> bool {
        self.line == other.line && self.template_id == other.template_id
    }

    /// This frame followed by every previous frame, most recent first.
    pub fn chain(&self) -> impl Iterator<Item = &StackFrame> {
        iter::successors(Some(self), |frame| frame.previous.as_deref())
    }

    /// The scopes of this frame, computed on first call.
    pub(crate) fn scopes(&self, ids: &Ids) -> &[Arc<Scope>] {
        self.scopes.get_or_init(|| {
            vec![
                Arc::new(Scope::new(
                    ScopeKind::Global,
                    ids.next_variables(),
                    Arc::clone(&self.context),
                )),
                Arc::new(Scope::new(
                    ScopeKind::Local,
                    ids.next_variables(),
                    Arc::clone(&self.context),
                )),
            ]
        })
    }

    /// The scopes of this frame if they have been computed already.
    #[must_use]
    pub fn cached_scopes(&self) -> Option<&[Arc<Scope>]> {
        self.scopes.get().map(Vec::as_slice)
    }
}

impl fmt::Debug for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackFrame")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("template_id", &self.template_id)
            .field("line", &self.line)
            .field("depth", &self.depth)
            .field("previous", &self.previous.as_ref().map(|frame| frame.id))
            .finish_non_exhaustive()
    }
}

impl Drop for StackFrame {
    // Unlink iteratively, a long render produces chains deep enough to
    // overflow the stack with the recursive drop.
    fn drop(&mut self) {
        let mut next = self.previous.take();
        while let Some(frame) = next {
            match Arc::try_unwrap(frame) {
                Ok(mut frame) => next = frame.previous.take(),
                Err(_) => break,
            }
        }
    }
}

/// Which bindings a scope exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeKind {
    /// The root data of the render.
    Global,
    /// Names resolved locally at the frame.
    Local,
}

impl ScopeKind {
    /// Display name of the scope.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Global => "Global",
            Self::Local => "Local",
        }
    }
}

/// A named group of variables visible at a frame.
pub struct Scope {
    kind: ScopeKind,
    variables_reference: VariablesReference,
    context: Arc<dyn RenderContext>,
    variables: OnceCell<Vec<Variable>>,
}

impl Scope {
    fn new(
        kind: ScopeKind,
        variables_reference: VariablesReference,
        context: Arc<dyn RenderContext>,
    ) -> Self {
        Self {
            kind,
            variables_reference,
            context,
            variables: OnceCell::new(),
        }
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Scope kind.
    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Handle used to list this scope's variables.
    #[must_use]
    pub fn variables_reference(&self) -> VariablesReference {
        self.variables_reference
    }

    /// The variables of this scope, computed on first call.
    pub fn variables(&self) -> &[Variable] {
        self.variables.get_or_init(|| {
            let bindings = match self.kind {
                ScopeKind::Global => self.context.global_bindings(),
                ScopeKind::Local => self.context.local_bindings(),
            };
            bindings
                .iter()
                .map(|(name, value)| Variable::from_binding(name, value))
                .collect()
        })
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("kind", &self.kind)
            .field("variables_reference", &self.variables_reference)
            .field("variables", &self.variables.get())
            .finish_non_exhaustive()
    }
}

/// A single binding, rendered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Binding name.
    pub name: String,
    /// Display value.
    pub value: String,
    /// JSON kind of the value.
    #[serde(rename = "type")]
    pub type_name: String,
}

impl Variable {
    /// Renders a binding. Strings are shown unquoted, everything else as JSON.
    #[must_use]
    pub fn from_binding(name: &str, value: &Value) -> Self {
        let (display, type_name) = match value {
            Value::Null => ("null".to_string(), "null"),
            Value::Bool(value) => (value.to_string(), "boolean"),
            Value::Number(value) => (value.to_string(), "number"),
            Value::String(value) => (value.clone(), "string"),
            Value::Array(_) => (value.to_string(), "array"),
            Value::Object(_) => (value.to_string(), "object"),
        };
        Self {
            name: name.to_string(),
            value: display,
            type_name: type_name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{ExecutionId, MapContext};
    use serde_json::json;
    use test_case::test_case;

    fn resolve(line: u32, context: MapContext) -> ResolveEvent<'static> {
        ResolveEvent {
            execution: ExecutionId(1),
            template_id: "page.html",
            line,
            description: "{item.name}",
            context: Arc::new(context),
        }
    }

    #[test]
    fn frames_link_to_the_previous_top() {
        let ids = Ids::default();
        let first = Arc::new(StackFrame::new(
            ids.next_frame(),
            &resolve(1, MapContext::default()),
            1,
            None,
        ));
        let second = StackFrame::new(
            ids.next_frame(),
            &resolve(2, MapContext::default()),
            1,
            Some(Arc::clone(&first)),
        );

        let lines: Vec<u32> = second.chain().map(StackFrame::line).collect();
        assert_eq!(lines, vec![2, 1]);
        assert_eq!(second.previous().map(|frame| frame.id()), Some(first.id()));
        assert_eq!(second.name(), "{item.name}");
        assert!(!second.same_position(&first));
    }

    #[test]
    fn empty_description_falls_back_to_position() {
        let mut event = resolve(4, MapContext::default());
        event.description = "";
        let frame = StackFrame::new(FrameId(1), &event, 1, None);
        assert_eq!(frame.name(), "page.html:4");
    }

    #[test]
    fn scopes_are_computed_once() {
        let ids = Ids::default();
        let context = MapContext::from_globals(json!({ "title": "Hi", "count": 2 }))
            .with_local("item", json!({ "name": "pen" }));
        let frame = StackFrame::new(ids.next_frame(), &resolve(3, context), 1, None);

        assert!(frame.cached_scopes().is_none());
        let scopes = frame.scopes(&ids);
        let references: Vec<_> = scopes.iter().map(|s| s.variables_reference()).collect();
        assert_eq!(frame.scopes(&ids).len(), 2);
        assert_eq!(
            frame
                .scopes(&ids)
                .iter()
                .map(|s| s.variables_reference())
                .collect::<Vec<_>>(),
            references
        );

        let global = &scopes[0];
        assert_eq!(global.name(), "Global");
        assert_eq!(
            global.variables(),
            &[
                Variable::from_binding("count", &json!(2)),
                Variable::from_binding("title", &json!("Hi")),
            ]
        );

        let local = &scopes[1];
        assert_eq!(local.kind(), ScopeKind::Local);
        assert_eq!(local.variables()[0].value, r#"{"name":"pen"}"#);
    }

    #[test_case(json!(null), "null", "null")]
    #[test_case(json!(true), "true", "boolean")]
    #[test_case(json!(1.5), "1.5", "number")]
    #[test_case(json!("text"), "text", "string")]
    #[test_case(json!([1, 2]), "[1,2]", "array")]
    fn variables_render_json_values(value: Value, display: &str, type_name: &str) {
        let variable = Variable::from_binding("x", &value);
        assert_eq!(variable.value, display);
        assert_eq!(variable.type_name, type_name);
    }

    #[test]
    fn dropping_a_long_chain_does_not_overflow() {
        let ids = Ids::default();
        let event = resolve(1, MapContext::default());
        let mut top: Option<Arc<StackFrame>> = None;
        for _ in 0..200_000 {
            top = Some(Arc::new(StackFrame::new(ids.next_frame(), &event, 1, top)));
        }
        drop(top);
    }
}
