//! Transport-agnostic command interface
//!
//! This module models the debugger's remote surface as request/response
//! pairs plus server-pushed events, shaped after the Debug Adapter Protocol
//! so a DAP transport can carry them verbatim.
//!
//! # Architecture
//!
//! The command interface consists of:
//! - Protocol types and messages (requests, responses, events)
//! - A [`Dispatcher`] that executes requests against a
//!   [`DebugSession`](crate::DebugSession)
//! - An [`EventForwarder`] listener that queues notifications as events
//!
//! Framing and I/O are left to the transport. It feeds decoded [`Request`]s
//! to the dispatcher, writes back the [`Response`], and drains the
//! forwarder's channel for events.
//!
//! # References
//!
//! - [DAP Specification](https://microsoft.github.io/debug-adapter-protocol/)

pub mod dispatcher;
pub mod forwarder;
pub mod messages;

pub use dispatcher::Dispatcher;
pub use forwarder::EventForwarder;

use serde::{Deserialize, Serialize};
use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

/// Protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProtocolMessage {
    /// A client request.
    #[serde(rename = "request")]
    Request(Request),
    /// The answer to a request.
    #[serde(rename = "response")]
    Response(Response),
    /// A notification pushed to the client.
    #[serde(rename = "event")]
    Event(Event),
}

impl ProtocolMessage {
    /// Sequence number of the message.
    #[must_use]
    pub fn seq(&self) -> i64 {
        match self {
            Self::Request(r) => r.seq,
            Self::Response(r) => r.seq,
            Self::Event(e) => e.seq,
        }
    }
}

/// Request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Client sequence number.
    pub seq: i64,
    /// Command name, e.g. `continue`.
    pub command: String,
    /// Command arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

/// Response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Sequence number of this message.
    pub seq: i64,
    /// Sequence number of the answered request.
    pub request_seq: i64,
    /// Whether the request succeeded.
    pub success: bool,
    /// Command name of the answered request.
    pub command: String,
    /// Error message when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Command-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// Event message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sequence number of this message.
    pub seq: i64,
    /// Event name, e.g. `stopped`.
    pub event: String,
    /// Event-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// Outgoing sequence numbers, shared by the dispatcher and the forwarder so
/// responses and events are numbered in one series.
#[derive(Debug, Clone)]
pub struct Sequence(Arc<AtomicI64>);

impl Default for Sequence {
    fn default() -> Self {
        Self(Arc::new(AtomicI64::new(1)))
    }
}

impl Sequence {
    /// Creates a series starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the next number.
    #[must_use]
    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}
