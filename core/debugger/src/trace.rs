//! Trace hooks emitted by the render engine.
//!
//! The engine does not know about the debugger. It only reports, for every
//! render it performs, when a template starts, when a node has been resolved
//! and when the template ends. [`DebugSession`](crate::DebugSession)
//! implements [`TraceListener`] so it can be installed as that hook.

use serde_json::{Map, Value};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// Identity of one native render execution.
///
/// All events of a single render carry the same id. Engines that render on a
/// dedicated thread per request can use [`ExecutionId::current_thread`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionId(pub u64);

impl ExecutionId {
    /// A stable id for the calling thread.
    #[must_use]
    pub fn current_thread() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        thread_local! {
            static CURRENT: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
        }
        Self(CURRENT.with(|id| *id))
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read access to the data a render sees at one node.
///
/// Stack frames keep the context alive so a client can inspect it while the
/// render is suspended, hence the `Send + Sync` bound.
pub trait RenderContext: Send + Sync {
    /// Bindings of the root data object the template was rendered with.
    fn global_bindings(&self) -> Vec<(String, Value)>;

    /// Names resolved locally at this node (section aliases, loop items, `let`).
    fn local_bindings(&self) -> Vec<(String, Value)>;
}

impl fmt::Debug for dyn RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext").finish_non_exhaustive()
    }
}

/// A [`RenderContext`] backed by two JSON maps.
#[derive(Debug, Clone, Default)]
pub struct MapContext {
    globals: Map<String, Value>,
    locals: Map<String, Value>,
}

impl MapContext {
    /// Creates a context from its global and local bindings.
    #[must_use]
    pub fn new(globals: Map<String, Value>, locals: Map<String, Value>) -> Self {
        Self { globals, locals }
    }

    /// Creates a context from a JSON object of globals, without locals.
    ///
    /// Anything other than an object yields no bindings.
    #[must_use]
    pub fn from_globals(globals: Value) -> Self {
        match globals {
            Value::Object(globals) => Self::new(globals, Map::new()),
            _ => Self::default(),
        }
    }

    /// Adds a local binding.
    #[must_use]
    pub fn with_local(mut self, name: impl Into<String>, value: Value) -> Self {
        self.locals.insert(name.into(), value);
        self
    }
}

impl RenderContext for MapContext {
    fn global_bindings(&self) -> Vec<(String, Value)> {
        self.globals
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn local_bindings(&self) -> Vec<(String, Value)> {
        self.locals
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

/// A template started or ended.
#[derive(Debug, Clone, Copy)]
pub struct TemplateEvent<'a> {
    /// The render this event belongs to.
    pub execution: ExecutionId,
    /// Id of the template.
    pub template_id: &'a str,
}

/// A template node has been resolved.
#[derive(Debug, Clone)]
pub struct ResolveEvent<'a> {
    /// The render this event belongs to.
    pub execution: ExecutionId,
    /// Id of the template owning the node.
    pub template_id: &'a str,
    /// Line of the node in the template source.
    pub line: u32,
    /// Human readable description of the node, e.g. `{item.name}`.
    pub description: &'a str,
    /// Data visible at the node.
    pub context: Arc<dyn RenderContext>,
}

/// Hooks the render engine invokes during template evaluation.
pub trait TraceListener: Send + Sync {
    /// Called before the first node of a template is rendered.
    fn start_template(&self, event: &TemplateEvent<'_>);

    /// Called before a node is resolved.
    ///
    /// The debugger only needs resolved nodes, so this does nothing by default.
    fn before_resolve(&self, _event: &ResolveEvent<'_>) {}

    /// Called after a node is resolved. May block the calling thread.
    fn after_resolve(&self, event: &ResolveEvent<'_>);

    /// Called once the template is fully rendered.
    fn end_template(&self, event: &TemplateEvent<'_>);
}

impl<T: TraceListener + ?Sized> TraceListener for Arc<T> {
    fn start_template(&self, event: &TemplateEvent<'_>) {
        (**self).start_template(event);
    }

    fn before_resolve(&self, event: &ResolveEvent<'_>) {
        (**self).before_resolve(event);
    }

    fn after_resolve(&self, event: &ResolveEvent<'_>) {
        (**self).after_resolve(event);
    }

    fn end_template(&self, event: &TemplateEvent<'_>) {
        (**self).end_template(event);
    }
}
