//! Notifications delivered to debugger listeners.
//!
//! Notifications are fired synchronously from whichever thread caused the
//! transition, usually the render thread right before it blocks. A failing
//! listener is logged and skipped; it never reaches the render thread.

use crate::tracker::TrackerId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    any::Any,
    error::Error,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// Why a render stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// A step request was satisfied.
    Step,
    /// A breakpoint was hit.
    Breakpoint,
    /// A pause request was honored.
    Pause,
}

impl StopReason {
    /// The name used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Step => "step",
            Self::Breakpoint => "breakpoint",
            Self::Pause => "pause",
        }
    }
}

/// Lifecycle status reported by a [`ThreadEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThreadStatus {
    /// A render started being tracked.
    Started,
    /// A render finished and its tracker was dropped.
    Exited,
}

impl ThreadStatus {
    /// The name used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Exited => "exited",
        }
    }
}

/// A render was suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoppedEvent {
    /// The suspended tracker.
    pub tracker: TrackerId,
    /// What stopped it.
    pub reason: StopReason,
}

/// A render started or exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadEvent {
    /// The tracker concerned.
    pub tracker: TrackerId,
    /// Whether it started or exited.
    pub status: ThreadStatus,
}

/// The session was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TerminateNotification;

/// Result returned by listener callbacks.
pub type ListenerResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Observer of debugger notifications.
///
/// Every callback has an empty default implementation.
pub trait DebugListener: Send + Sync {
    /// A render was suspended at a breakpoint or step.
    fn stopped(&self, _event: &StoppedEvent) -> ListenerResult {
        Ok(())
    }

    /// A render started or exited.
    fn thread_changed(&self, _event: &ThreadEvent) -> ListenerResult {
        Ok(())
    }

    /// The session was terminated.
    fn terminated(&self, _event: &TerminateNotification) -> ListenerResult {
        Ok(())
    }
}

/// Handle returned when registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The set of registered listeners and the fan-out over it.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ListenerId, Arc<dyn DebugListener>)>>,
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.entries.read().len())
            .finish()
    }
}

impl Listeners {
    pub(crate) fn add(&self, listener: Arc<dyn DebugListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, listener));
        id
    }

    /// Removes a listener, returning how many remain, or `None` if `id` was
    /// not registered.
    pub(crate) fn remove(&self, id: ListenerId) -> Option<usize> {
        let mut entries = self.entries.write();
        let index = entries.iter().position(|(entry, _)| *entry == id)?;
        entries.remove(index);
        Some(entries.len())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub(crate) fn fire_stopped(&self, event: &StoppedEvent) {
        self.each("stopped", |listener| listener.stopped(event));
    }

    pub(crate) fn fire_thread_changed(&self, event: &ThreadEvent) {
        self.each("thread", |listener| listener.thread_changed(event));
    }

    pub(crate) fn fire_terminated(&self) {
        self.each("terminated", |listener| {
            listener.terminated(&TerminateNotification)
        });
    }

    /// Calls `notify` on every listener. The list is snapshotted first so
    /// callbacks may add or remove listeners.
    fn each<F>(&self, kind: &str, notify: F)
    where
        F: Fn(&dyn DebugListener) -> ListenerResult,
    {
        let snapshot: Vec<_> = self.entries.read().clone();
        for (id, listener) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| notify(listener.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    log::error!("listener {id} failed handling {kind} notification: {err}");
                }
                Err(payload) => {
                    log::error!(
                        "listener {id} panicked handling {kind} notification: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}
