//! Qute's template debugger core
//!
//! This crate lets an external client set breakpoints on template source
//! lines, inspect the call stack, scopes and variables of in-flight renders,
//! and pause, resume or step any number of renders executing concurrently.
//!
//! # Overview
//!
//! The debugger consists of several key components:
//!
//! - [`DebugSession`]: The single entry point. It owns the breakpoint
//!   registry, the live [`ExecutionTracker`]s and the registered listeners.
//! - [`TraceListener`]: The hook surface the render engine calls into. The
//!   session implements it.
//! - [`ExecutionTracker`]: One per concurrently running render. Owns a frame
//!   stack and the suspend/resume state machine.
//! - Inspection objects: [`StackFrame`], [`Scope`] and [`Variable`].
//! - [`DebugListener`]: Receives stopped, thread and terminate notifications.
//! - [`protocol`]: A transport-agnostic request/response and event model on
//!   top of the session.
//!
//! # Architecture
//!
//! Suspension is cooperative. The render thread itself calls
//! [`TraceListener::after_resolve`] at every template node and, if a
//! breakpoint or step request matches, blocks there on a private channel of
//! its tracker until the controlling thread resumes it:
//!
//! - `start_template`: Creates the tracker for a render (or opens a nested
//!   template on an existing one).
//! - `after_resolve`: Pushes a frame and evaluates the stop condition.
//! - `end_template`: Closes a template; the tracker is dropped once the
//!   outermost template ends.
//!
//! # Example
//!
//! ```rust,ignore
//! use qute_debug::{DebugSession, ExecutionId, TemplateEvent, TraceListener};
//! use std::sync::Arc;
//!
//! let session = Arc::new(DebugSession::new());
//!
//! // Set a breakpoint
//! session.set_breakpoint("hello.html", 10);
//!
//! // Hand the session to the engine as its trace hook. Renders reaching
//! // line 10 of `hello.html` will now block until resumed.
//! engine.set_trace_listener(session.clone());
//! ```

#![doc(html_root_url = "https://docs.rs/qute_debug/")]

pub mod breakpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod frame;
pub mod protocol;
pub mod session;
pub mod state;
pub mod trace;
pub mod tracker;

pub use breakpoint::{Breakpoint, Breakpoints};
pub use config::{DebugSessionBuilder, SessionConfig};
pub use error::{DebugError, DebugResult, ProtocolError, ProtocolResult};
pub use event::{
    DebugListener, ListenerId, ListenerResult, StopReason, StoppedEvent, TerminateNotification,
    ThreadEvent, ThreadStatus,
};
pub use frame::{FrameId, Scope, ScopeKind, StackFrame, Variable, VariablesReference};
pub use session::{DebugSession, ThreadInfo};
pub use state::{StepMode, TrackerState};
pub use trace::{ExecutionId, MapContext, RenderContext, ResolveEvent, TemplateEvent, TraceListener};
pub use tracker::{ExecutionTracker, TrackerId};
