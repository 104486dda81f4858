//! Debug session management
//!
//! The session is the single entry point of the debugger. Render engines
//! drive it through [`TraceListener`], clients through the control and query
//! methods below. All registries are owned by the session and shared through
//! `Arc<DebugSession>` rather than through global state.

use crate::{
    breakpoint::{Breakpoint, Breakpoints},
    config::{DebugSessionBuilder, SessionConfig},
    error::DebugResult,
    event::{DebugListener, ListenerId, Listeners, ThreadEvent, ThreadStatus},
    frame::{FrameId, Ids, Scope, StackFrame, Variable, VariablesReference},
    state::TrackerState,
    trace::{ExecutionId, ResolveEvent, TemplateEvent, TraceListener},
    tracker::{Checkpoint, ExecutionTracker, TrackerId},
};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

/// A live render, as listed to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadInfo {
    /// Tracker id.
    pub id: TrackerId,
    /// Display name.
    pub name: String,
    /// Current state.
    pub state: TrackerState,
}

/// Registry of breakpoints, live renders and listeners.
#[derive(Debug)]
pub struct DebugSession {
    config: SessionConfig,
    breakpoints: Breakpoints,
    listeners: Listeners,
    ids: Ids,
    next_tracker: AtomicI64,
    trackers: DashMap<TrackerId, Arc<ExecutionTracker>>,
    executions: DashMap<ExecutionId, TrackerId>,
    /// Trackers stopped by [`terminate`](Self::terminate) whose render has not
    /// ended its outermost template yet.
    terminated: DashMap<ExecutionId, Arc<ExecutionTracker>>,
    /// Held for reading while trackers are created or dropped, for writing
    /// by [`terminate`](Self::terminate).
    lifecycle: RwLock<()>,
    /// Frames handed out through stack traces, so scopes can be resolved by id.
    frames: DashMap<FrameId, (TrackerId, Arc<StackFrame>)>,
    /// Scopes handed out to clients, so variables can be resolved by reference.
    scopes: DashMap<VariablesReference, (TrackerId, Arc<Scope>)>,
}

impl Default for DebugSession {
    fn default() -> Self {
        Self::with_config(SessionConfig::default())
    }
}

impl DebugSession {
    /// Creates a session with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a builder for a configured session.
    #[must_use]
    pub fn builder() -> DebugSessionBuilder {
        DebugSessionBuilder::new()
    }

    /// Creates a session with the given configuration.
    #[must_use]
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            config,
            breakpoints: Breakpoints::new(),
            listeners: Listeners::default(),
            ids: Ids::default(),
            next_tracker: AtomicI64::new(1),
            trackers: DashMap::new(),
            executions: DashMap::new(),
            terminated: DashMap::new(),
            lifecycle: RwLock::new(()),
            frames: DashMap::new(),
            scopes: DashMap::new(),
        }
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Breakpoints
    // ------------------------------------------------------------------

    /// Sets a breakpoint. Setting an existing one returns it unchanged.
    pub fn set_breakpoint(&self, template_id: &str, line: u32) -> Breakpoint {
        self.breakpoints.set(template_id, line)
    }

    /// Looks up a breakpoint.
    #[must_use]
    pub fn get_breakpoint(&self, template_id: &str, line: u32) -> Option<Breakpoint> {
        self.breakpoints.get(template_id, line)
    }

    /// Removes a breakpoint, returning whether it existed.
    pub fn remove_breakpoint(&self, template_id: &str, line: u32) -> bool {
        self.breakpoints.remove(template_id, line)
    }

    /// Replaces all breakpoints of one template.
    pub fn set_breakpoints(&self, template_id: &str, lines: &[u32]) -> Vec<Breakpoint> {
        self.breakpoints.replace(template_id, lines)
    }

    /// Removes every breakpoint.
    pub fn clear_breakpoints(&self) {
        self.breakpoints.clear();
    }

    /// The breakpoint registry.
    #[must_use]
    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Registers a listener.
    pub fn add_listener(&self, listener: Arc<dyn DebugListener>) -> ListenerId {
        let id = self.listeners.add(listener);
        log::debug!("listener {id} added");
        id
    }

    /// Unregisters a listener, returning whether it was registered.
    ///
    /// Removing the last listener resumes every suspended render when
    /// [`SessionConfig::release_when_unobserved`] is set.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let Some(remaining) = self.listeners.remove(id) else {
            return false;
        };
        log::debug!("listener {id} removed");

        if remaining == 0 && self.config.release_when_unobserved {
            let released = self
                .live_trackers()
                .iter()
                .filter(|tracker| tracker.release())
                .count();
            if released > 0 {
                log::info!("no listener left, released {released} suspended render(s)");
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------

    /// Looks up a live tracker.
    #[must_use]
    pub fn tracker(&self, id: TrackerId) -> Option<Arc<ExecutionTracker>> {
        self.trackers.get(&id).map(|tracker| Arc::clone(&tracker))
    }

    /// State of a tracker, `None` if it is unknown.
    #[must_use]
    pub fn get_state(&self, id: TrackerId) -> Option<TrackerState> {
        self.tracker(id).map(|tracker| tracker.state())
    }

    /// See [`ExecutionTracker::pause`]. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Fails if the tracker is not running.
    pub fn pause(&self, id: TrackerId) -> DebugResult<()> {
        self.command(id, "pause", ExecutionTracker::pause)
    }

    /// See [`ExecutionTracker::resume`]. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Fails if the tracker is not suspended.
    pub fn resume(&self, id: TrackerId) -> DebugResult<()> {
        self.command(id, "resume", ExecutionTracker::resume)
    }

    /// See [`ExecutionTracker::step_in`]. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Fails if the tracker is not suspended.
    pub fn step_in(&self, id: TrackerId) -> DebugResult<()> {
        self.command(id, "step in", ExecutionTracker::step_in)
    }

    /// See [`ExecutionTracker::step_out`]. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Fails if the tracker is not suspended.
    pub fn step_out(&self, id: TrackerId) -> DebugResult<()> {
        self.command(id, "step out", ExecutionTracker::step_out)
    }

    /// See [`ExecutionTracker::step_over`]. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Fails if the tracker is not suspended.
    pub fn step_over(&self, id: TrackerId) -> DebugResult<()> {
        self.command(id, "step over", ExecutionTracker::step_over)
    }

    fn command<F>(&self, id: TrackerId, operation: &str, run: F) -> DebugResult<()>
    where
        F: FnOnce(&ExecutionTracker) -> DebugResult<()>,
    {
        match self.tracker(id) {
            Some(tracker) => run(&tracker),
            None => {
                log::warn!("ignoring {operation} for unknown tracker {id}");
                Ok(())
            }
        }
    }

    /// Stops every render, clears all breakpoints and tracker state, then
    /// notifies every listener once.
    ///
    /// Renders parked at a checkpoint are woken and unwind immediately; a
    /// render between checkpoints only notices at its next one. Either way
    /// the render keeps its stopped tracker until its outermost template
    /// ends, so it is never tracked again.
    pub fn terminate(&self) {
        let stopped = {
            let _lifecycle = self.lifecycle.write();
            let trackers = self.live_trackers();
            for tracker in &trackers {
                tracker.terminate();
                self.terminated
                    .insert(tracker.execution(), Arc::clone(tracker));
            }

            self.breakpoints.clear();
            self.trackers.clear();
            self.executions.clear();
            self.frames.clear();
            self.scopes.clear();
            trackers.len()
        };

        log::info!("session terminated, stopped {stopped} render(s)");
        self.listeners.fire_terminated();
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Every live render.
    #[must_use]
    pub fn threads(&self) -> Vec<ThreadInfo> {
        let mut threads: Vec<ThreadInfo> = self
            .live_trackers()
            .iter()
            .map(|tracker| ThreadInfo {
                id: tracker.id(),
                name: tracker.name().to_string(),
                state: tracker.state(),
            })
            .collect();
        threads.sort_by_key(|thread| thread.id);
        threads
    }

    /// The frames of a suspended render, most recent first. Empty for
    /// unknown or running trackers.
    #[must_use]
    pub fn get_stack_trace(&self, id: TrackerId) -> Vec<Arc<StackFrame>> {
        let Some(tracker) = self.tracker(id) else {
            return Vec::new();
        };
        let frames = tracker.stack_trace();
        for frame in &frames {
            self.frames
                .entry(frame.id())
                .or_insert_with(|| (id, Arc::clone(frame)));
        }
        frames
    }

    /// The scopes of a frame previously returned by
    /// [`get_stack_trace`](Self::get_stack_trace). Empty for unknown ids.
    #[must_use]
    pub fn get_scopes(&self, frame: FrameId) -> Vec<Arc<Scope>> {
        let Some((tracker, frame)) = self.frames.get(&frame).map(|entry| entry.value().clone())
        else {
            return Vec::new();
        };
        let scopes = frame.scopes(&self.ids).to_vec();
        for scope in &scopes {
            self.scopes
                .entry(scope.variables_reference())
                .or_insert_with(|| (tracker, Arc::clone(scope)));
        }
        scopes
    }

    /// The variables of a scope previously returned by
    /// [`get_scopes`](Self::get_scopes). Empty for unknown references.
    #[must_use]
    pub fn get_variables(&self, reference: VariablesReference) -> Vec<Variable> {
        let Some(scope) = self
            .scopes
            .get(&reference)
            .map(|entry| Arc::clone(&entry.value().1))
        else {
            return Vec::new();
        };
        scope.variables().to_vec()
    }

    // ------------------------------------------------------------------
    // Trace entry points
    // ------------------------------------------------------------------

    /// Whether anybody is debugging. When not, trace events are ignored.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.listeners.is_empty() || !self.breakpoints.is_empty()
    }

    /// A template started rendering.
    ///
    /// Renders that already have a tracker are followed even when nobody is
    /// debugging any more, so their nesting stays balanced.
    pub fn on_start_template(&self, event: &TemplateEvent<'_>) {
        if !self.is_active() && !self.is_tracked(event.execution) {
            return;
        }
        self.tracker_for(event.execution, event.template_id)
            .enter_template();
    }

    /// A template node was resolved. Blocks the caller while its render is
    /// suspended.
    pub fn on_template_node(&self, event: &ResolveEvent<'_>) {
        if !self.is_active() {
            return;
        }
        let tracker = self.tracker_for(event.execution, event.template_id);
        tracker.on_template_node(
            event,
            Checkpoint {
                breakpoints: &self.breakpoints,
                listeners: &self.listeners,
                ids: &self.ids,
            },
        );
    }

    /// A template finished rendering. The tracker is dropped once its
    /// outermost template ends.
    ///
    /// This runs even when nobody is debugging, so trackers created earlier
    /// are never leaked.
    pub fn on_end_template(&self, event: &TemplateEvent<'_>) {
        let execution = event.execution;
        let exited = {
            let _lifecycle = self.lifecycle.read();
            let stopped = self
                .terminated
                .get(&execution)
                .map(|tracker| Arc::clone(&tracker));
            if let Some(tracker) = stopped {
                if tracker.exit_template() {
                    self.terminated.remove(&execution);
                    log::debug!("terminated render {execution} unwound");
                }
                return;
            }

            let Some(id) = self.executions.get(&execution).map(|id| *id) else {
                return;
            };
            let Some(tracker) = self.tracker(id) else {
                self.executions.remove(&execution);
                return;
            };
            if !tracker.exit_template() {
                return;
            }
            self.unregister(execution, id);
            id
        };

        log::debug!("render {execution} finished, tracker {exited} dropped");
        self.listeners.fire_thread_changed(&ThreadEvent {
            tracker: exited,
            status: ThreadStatus::Exited,
        });
    }

    /// Whether `execution` has a tracker, live or stopped.
    fn is_tracked(&self, execution: ExecutionId) -> bool {
        self.executions.contains_key(&execution) || self.terminated.contains_key(&execution)
    }

    /// The tracker following `execution`, including a stopped one.
    fn lookup(&self, execution: ExecutionId) -> Option<Arc<ExecutionTracker>> {
        self.executions
            .get(&execution)
            .and_then(|id| self.tracker(*id))
            .or_else(|| {
                self.terminated
                    .get(&execution)
                    .map(|tracker| Arc::clone(&tracker))
            })
    }

    fn tracker_for(&self, execution: ExecutionId, template_id: &str) -> Arc<ExecutionTracker> {
        let tracker = {
            let _lifecycle = self.lifecycle.read();
            if let Some(tracker) = self.lookup(execution) {
                return tracker;
            }

            let id = TrackerId(self.next_tracker.fetch_add(1, Ordering::Relaxed));
            let tracker = Arc::new(ExecutionTracker::new(id, execution, template_id));
            self.trackers.insert(id, Arc::clone(&tracker));
            self.executions.insert(execution, id);
            tracker
        };

        log::debug!("tracking render {execution} as tracker {}", tracker.id());
        self.listeners.fire_thread_changed(&ThreadEvent {
            tracker: tracker.id(),
            status: ThreadStatus::Started,
        });
        tracker
    }

    fn unregister(&self, execution: ExecutionId, id: TrackerId) {
        self.trackers.remove(&id);
        self.executions
            .remove_if(&execution, |_, tracker| *tracker == id);
        self.frames.retain(|_, (tracker, _)| *tracker != id);
        self.scopes.retain(|_, (tracker, _)| *tracker != id);
    }

    fn live_trackers(&self) -> Vec<Arc<ExecutionTracker>> {
        self.trackers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

impl TraceListener for DebugSession {
    fn start_template(&self, event: &TemplateEvent<'_>) {
        self.on_start_template(event);
    }

    fn after_resolve(&self, event: &ResolveEvent<'_>) {
        self.on_template_node(event);
    }

    fn end_template(&self, event: &TemplateEvent<'_>) {
        self.on_end_template(event);
    }
}
