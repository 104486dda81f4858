//! Per-render execution tracking and the suspend/resume state machine.
//!
//! Each concurrently running render owns one [`ExecutionTracker`]. The render
//! thread pushes a frame at every checkpoint and, when a breakpoint or step
//! request matches, parks on the tracker's private wake channel. Control
//! commands come from another thread: they only flip the state under the
//! tracker's lock and post a wake token, so a parked render never blocks any
//! other tracker.

use crate::{
    breakpoint::Breakpoints,
    error::{DebugError, DebugResult},
    event::{Listeners, StopReason, StoppedEvent},
    frame::{Ids, StackFrame},
    state::{StepMode, TrackerState},
    trace::{ExecutionId, ResolveEvent},
};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{fmt, iter, sync::Arc};

/// Client-visible identifier of a tracker, the "thread id" of a debug client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackerId(pub i64);

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session collaborators consulted at a checkpoint.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint<'a> {
    pub(crate) breakpoints: &'a Breakpoints,
    pub(crate) listeners: &'a Listeners,
    pub(crate) ids: &'a Ids,
}

#[derive(Debug)]
struct Inner {
    state: TrackerState,
    top: Option<Arc<StackFrame>>,
    frame_count: usize,
    step: Option<StepMode>,
    nesting: usize,
}

/// Frame stack and suspend state of one render.
pub struct ExecutionTracker {
    id: TrackerId,
    execution: ExecutionId,
    name: String,
    inner: Mutex<Inner>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl fmt::Debug for ExecutionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionTracker")
            .field("id", &self.id)
            .field("execution", &self.execution)
            .field("name", &self.name)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl ExecutionTracker {
    pub(crate) fn new(id: TrackerId, execution: ExecutionId, template_id: &str) -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        Self {
            id,
            execution,
            name: format!("{template_id} (render {execution})"),
            inner: Mutex::new(Inner {
                state: TrackerState::Initialized,
                top: None,
                frame_count: 0,
                step: None,
                nesting: 0,
            }),
            wake_tx,
            wake_rx,
        }
    }

    /// The tracker id.
    #[must_use]
    pub fn id(&self) -> TrackerId {
        self.id
    }

    /// The render this tracker follows.
    #[must_use]
    pub fn execution(&self) -> ExecutionId {
        self.execution
    }

    /// Display name, derived from the first template seen.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TrackerState {
        self.inner.lock().state
    }

    /// Number of frames pushed so far.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.inner.lock().frame_count
    }

    /// The most recently pushed frame.
    #[must_use]
    pub fn top_frame(&self) -> Option<Arc<StackFrame>> {
        self.inner.lock().top.clone()
    }

    /// The frame stack, most recent first.
    ///
    /// Only a suspended render has a quiescent stack, in any other state
    /// this is empty.
    #[must_use]
    pub fn stack_trace(&self) -> Vec<Arc<StackFrame>> {
        let inner = self.inner.lock();
        if inner.state != TrackerState::Suspended {
            return Vec::new();
        }
        iter::successors(inner.top.clone(), |frame| frame.previous().cloned()).collect()
    }

    /// A template started on this render.
    ///
    /// Nesting is counted in every state, a stopped render still has to be
    /// followed to its outermost `end_template`.
    pub(crate) fn enter_template(&self) {
        let mut inner = self.inner.lock();
        inner.nesting += 1;
        if inner.state == TrackerState::Initialized {
            inner.state = TrackerState::Running;
        }
    }

    /// A template ended on this render. Returns `true` once the outermost
    /// template has ended.
    pub(crate) fn exit_template(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.nesting = inner.nesting.saturating_sub(1);
        inner.nesting == 0
    }

    /// Records a resolved node and blocks the calling render thread if it
    /// must stop here.
    ///
    /// Returns the pushed frame, or `None` if the tracker was stopped.
    pub(crate) fn on_template_node(
        &self,
        event: &ResolveEvent<'_>,
        checkpoint: Checkpoint<'_>,
    ) -> Option<Arc<StackFrame>> {
        let mut inner = self.inner.lock();
        match inner.state {
            TrackerState::Stopped => return None,
            TrackerState::Initialized => {
                // Started tracking mid-template.
                inner.state = TrackerState::Running;
                inner.nesting = inner.nesting.max(1);
            }
            TrackerState::Running | TrackerState::Suspended => {}
        }

        let previous = inner.top.take();
        let frame = Arc::new(StackFrame::new(
            checkpoint.ids.next_frame(),
            event,
            inner.nesting,
            previous.clone(),
        ));
        inner.top = Some(Arc::clone(&frame));
        inner.frame_count += 1;

        let Some(reason) = stop_reason(
            inner.step,
            &frame,
            previous.as_deref(),
            checkpoint.breakpoints,
        ) else {
            return Some(frame);
        };

        inner.step = None;
        inner.state = TrackerState::Suspended;
        drop(inner);

        log::debug!(
            "tracker {} suspended at {}:{} ({})",
            self.id,
            frame.template_id(),
            frame.line(),
            reason.as_str()
        );
        checkpoint.listeners.fire_stopped(&StoppedEvent {
            tracker: self.id,
            reason,
        });
        self.wait_while_suspended();

        Some(frame)
    }

    /// Requests a stop at the next checkpoint.
    ///
    /// Suspension is cooperative: a render between checkpoints keeps going
    /// until it reaches the next one.
    ///
    /// # Errors
    ///
    /// Fails unless the tracker is [`TrackerState::Running`].
    pub fn pause(&self) -> DebugResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != TrackerState::Running {
            return Err(DebugError::invalid_state(self.id, "pause", inner.state));
        }
        inner.step = Some(StepMode::Pause);
        log::debug!("tracker {} will pause at its next checkpoint", self.id);
        Ok(())
    }

    /// Resumes a suspended render without any step request.
    ///
    /// # Errors
    ///
    /// Fails unless the tracker is [`TrackerState::Suspended`].
    pub fn resume(&self) -> DebugResult<()> {
        self.resume_with("resume", |_| None)
    }

    /// Resumes and stops again at the next checkpoint, at any depth.
    ///
    /// # Errors
    ///
    /// Fails unless the tracker is [`TrackerState::Suspended`].
    pub fn step_in(&self) -> DebugResult<()> {
        self.resume_with("step in", |_| Some(StepMode::In))
    }

    /// Resumes and stops at the next checkpoint no deeper than the current
    /// frame, skipping nested templates.
    ///
    /// # Errors
    ///
    /// Fails unless the tracker is [`TrackerState::Suspended`].
    pub fn step_over(&self) -> DebugResult<()> {
        self.resume_with("step over", |inner| {
            let depth = inner.top.as_ref().map_or(inner.nesting, |top| top.depth());
            Some(StepMode::Over { depth })
        })
    }

    /// Resumes without a step request; only breakpoints stop the render
    /// afterwards, exactly like [`resume`](Self::resume).
    ///
    /// # Errors
    ///
    /// Fails unless the tracker is [`TrackerState::Suspended`].
    pub fn step_out(&self) -> DebugResult<()> {
        self.resume_with("step out", |_| None)
    }

    fn resume_with<F>(&self, operation: &'static str, step: F) -> DebugResult<()>
    where
        F: FnOnce(&Inner) -> Option<StepMode>,
    {
        let mut inner = self.inner.lock();
        if inner.state != TrackerState::Suspended {
            return Err(DebugError::invalid_state(self.id, operation, inner.state));
        }
        inner.step = step(&*inner);
        inner.state = TrackerState::Running;
        drop(inner);

        log::debug!("tracker {} resumed ({operation})", self.id);
        self.wake();
        Ok(())
    }

    /// Resumes the render if it is suspended. Used when no observer is left.
    pub(crate) fn release(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != TrackerState::Suspended {
            return false;
        }
        inner.step = None;
        inner.state = TrackerState::Running;
        drop(inner);

        self.wake();
        true
    }

    /// Forces the tracker into [`TrackerState::Stopped`] and wakes the render.
    pub(crate) fn terminate(&self) {
        let mut inner = self.inner.lock();
        inner.state = TrackerState::Stopped;
        inner.step = None;
        drop(inner);

        self.wake();
    }

    fn wake(&self) {
        match self.wake_tx.try_send(()) {
            // A full slot already holds a wake-up for the render thread.
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                log::warn!("tracker {} lost its wake channel", self.id);
            }
        }
    }

    fn wait_while_suspended(&self) {
        loop {
            if self.inner.lock().state != TrackerState::Suspended {
                break;
            }
            if self.wake_rx.recv().is_err() {
                break;
            }
        }
        log::debug!("tracker {} continues", self.id);
    }
}

fn stop_reason(
    step: Option<StepMode>,
    frame: &StackFrame,
    previous: Option<&StackFrame>,
    breakpoints: &Breakpoints,
) -> Option<StopReason> {
    if let Some(step) = step
        && step.matches(frame.depth())
    {
        return Some(step.reason());
    }
    let repeated = previous.is_some_and(|previous| previous.same_position(frame));
    (!repeated && breakpoints.contains(frame.template_id(), frame.line()))
        .then_some(StopReason::Breakpoint)
}
