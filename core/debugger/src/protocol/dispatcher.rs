//! Request dispatch
//!
//! Turns decoded requests into [`DebugSession`] calls and wraps the outcome
//! in a response. Failures never escape: they come back as a response with
//! `success: false` and the error message.

use super::{
    Request, Response, Sequence,
    messages::{
        Breakpoint, ContinueResponseBody, Scope, ScopesArguments, ScopesResponseBody,
        SetBreakpointsArguments, SetBreakpointsResponseBody, Source, StackFrame,
        StackTraceArguments, StackTraceResponseBody, StateResponseBody, Thread, ThreadArguments,
        ThreadsResponseBody, Variable, VariablesArguments, VariablesResponseBody,
    },
};
use crate::{
    error::{ProtocolError, ProtocolResult},
    frame::{FrameId, ScopeKind, VariablesReference},
    session::DebugSession,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;

/// Executes protocol requests against a session.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    session: Arc<DebugSession>,
    seq: Sequence,
}

impl Dispatcher {
    /// Creates a dispatcher numbering its responses from a fresh sequence.
    #[must_use]
    pub fn new(session: Arc<DebugSession>) -> Self {
        Self::with_sequence(session, Sequence::new())
    }

    /// Creates a dispatcher sharing `seq` with an
    /// [`EventForwarder`](super::EventForwarder).
    #[must_use]
    pub fn with_sequence(session: Arc<DebugSession>, seq: Sequence) -> Self {
        Self { session, seq }
    }

    /// The session requests are executed against.
    #[must_use]
    pub fn session(&self) -> &Arc<DebugSession> {
        &self.session
    }

    /// Handles a request and returns its response.
    pub fn handle_request(&self, request: Request) -> Response {
        let Request {
            seq: request_seq,
            command,
            arguments,
        } = request;

        let result = match command.as_str() {
            "setBreakpoints" => self.handle_set_breakpoints(arguments),
            "threads" => self.handle_threads(),
            "state" => self.handle_state(arguments),
            "pause" => self.handle_pause(arguments),
            "continue" => self.handle_continue(arguments),
            "next" => self.handle_next(arguments),
            "stepIn" => self.handle_step_in(arguments),
            "stepOut" => self.handle_step_out(arguments),
            "stackTrace" => self.handle_stack_trace(arguments),
            "scopes" => self.handle_scopes(arguments),
            "variables" => self.handle_variables(arguments),
            "terminate" | "disconnect" => {
                self.session.terminate();
                Ok(None)
            }
            _ => Err(ProtocolError::UnknownCommand(command.clone())),
        };

        match result {
            Ok(body) => self.create_response(request_seq, command, true, None, body),
            Err(err) => {
                log::debug!("request {request_seq} ({command}) failed: {err}");
                self.create_response(request_seq, command, false, Some(err.to_string()), None)
            }
        }
    }

    fn handle_set_breakpoints(&self, arguments: Option<Value>) -> ProtocolResult<Option<Value>> {
        let args: SetBreakpointsArguments = parse_arguments(arguments)?;
        let template_id = args
            .source
            .template_id()
            .ok_or(ProtocolError::MissingSource)?
            .to_string();

        let requested: Vec<i64> = match (args.breakpoints, args.lines) {
            (Some(breakpoints), _) => breakpoints.iter().map(|bp| bp.line).collect(),
            (None, Some(lines)) => lines,
            (None, None) => Vec::new(),
        };
        let lines = requested
            .into_iter()
            .map(|line| match u32::try_from(line) {
                Ok(line) if line > 0 => Ok(line),
                _ => Err(ProtocolError::InvalidLine(line)),
            })
            .collect::<ProtocolResult<Vec<u32>>>()?;

        let breakpoints = self
            .session
            .set_breakpoints(&template_id, &lines)
            .into_iter()
            .map(|bp| Breakpoint {
                verified: true,
                source: Some(Source::template(&bp.template_id)),
                line: Some(i64::from(bp.line)),
            })
            .collect();

        to_body(&SetBreakpointsResponseBody { breakpoints })
    }

    fn handle_threads(&self) -> ProtocolResult<Option<Value>> {
        let threads = self
            .session
            .threads()
            .into_iter()
            .map(|thread| Thread {
                id: thread.id,
                name: thread.name,
            })
            .collect();
        to_body(&ThreadsResponseBody { threads })
    }

    fn handle_state(&self, arguments: Option<Value>) -> ProtocolResult<Option<Value>> {
        let args: ThreadArguments = parse_arguments(arguments)?;
        to_body(&StateResponseBody {
            state: self.session.get_state(args.thread_id),
        })
    }

    fn handle_pause(&self, arguments: Option<Value>) -> ProtocolResult<Option<Value>> {
        let args: ThreadArguments = parse_arguments(arguments)?;
        self.session.pause(args.thread_id)?;
        Ok(None)
    }

    fn handle_continue(&self, arguments: Option<Value>) -> ProtocolResult<Option<Value>> {
        let args: ThreadArguments = parse_arguments(arguments)?;
        self.session.resume(args.thread_id)?;
        to_body(&ContinueResponseBody {
            all_threads_continued: false,
        })
    }

    fn handle_next(&self, arguments: Option<Value>) -> ProtocolResult<Option<Value>> {
        let args: ThreadArguments = parse_arguments(arguments)?;
        self.session.step_over(args.thread_id)?;
        Ok(None)
    }

    fn handle_step_in(&self, arguments: Option<Value>) -> ProtocolResult<Option<Value>> {
        let args: ThreadArguments = parse_arguments(arguments)?;
        self.session.step_in(args.thread_id)?;
        Ok(None)
    }

    fn handle_step_out(&self, arguments: Option<Value>) -> ProtocolResult<Option<Value>> {
        let args: ThreadArguments = parse_arguments(arguments)?;
        self.session.step_out(args.thread_id)?;
        Ok(None)
    }

    fn handle_stack_trace(&self, arguments: Option<Value>) -> ProtocolResult<Option<Value>> {
        let args: StackTraceArguments = parse_arguments(arguments)?;
        let frames = self.session.get_stack_trace(args.thread_id);
        let total_frames = frames.len();
        let levels = match args.levels {
            None | Some(0) => usize::MAX,
            Some(levels) => levels,
        };

        let stack_frames = frames
            .iter()
            .skip(args.start_frame.unwrap_or(0))
            .take(levels)
            .map(|frame| StackFrame {
                id: frame.id().0,
                name: frame.name().to_string(),
                source: Some(Source::template(frame.template_id())),
                line: i64::from(frame.line()),
                column: 0,
            })
            .collect();

        to_body(&StackTraceResponseBody {
            stack_frames,
            total_frames,
        })
    }

    fn handle_scopes(&self, arguments: Option<Value>) -> ProtocolResult<Option<Value>> {
        let args: ScopesArguments = parse_arguments(arguments)?;
        let scopes = self
            .session
            .get_scopes(FrameId(args.frame_id))
            .iter()
            .map(|scope| Scope {
                name: scope.name().to_string(),
                presentation_hint: Some(
                    match scope.kind() {
                        ScopeKind::Global => "globals",
                        ScopeKind::Local => "locals",
                    }
                    .to_string(),
                ),
                variables_reference: scope.variables_reference().0,
                expensive: false,
            })
            .collect();
        to_body(&ScopesResponseBody { scopes })
    }

    fn handle_variables(&self, arguments: Option<Value>) -> ProtocolResult<Option<Value>> {
        let args: VariablesArguments = parse_arguments(arguments)?;
        let variables = self
            .session
            .get_variables(VariablesReference(args.variables_reference))
            .into_iter()
            .map(|variable| Variable {
                name: variable.name,
                value: variable.value,
                type_: Some(variable.type_name),
                variables_reference: 0,
            })
            .collect();
        to_body(&VariablesResponseBody { variables })
    }

    /// Creates a response message
    fn create_response(
        &self,
        request_seq: i64,
        command: String,
        success: bool,
        message: Option<String>,
        body: Option<Value>,
    ) -> Response {
        Response {
            seq: self.seq.next(),
            request_seq,
            success,
            command,
            message,
            body,
        }
    }
}

fn parse_arguments<T: DeserializeOwned>(arguments: Option<Value>) -> ProtocolResult<T> {
    serde_json::from_value(arguments.unwrap_or(Value::Null))
        .map_err(ProtocolError::InvalidArguments)
}

fn to_body<T: Serialize>(body: &T) -> ProtocolResult<Option<Value>> {
    serde_json::to_value(body)
        .map(Some)
        .map_err(ProtocolError::Serialize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use serde_json::json;

    fn request(command: &str, arguments: Value) -> Request {
        Request {
            seq: 1,
            command: command.to_string(),
            arguments: Some(arguments),
        }
    }

    #[test]
    fn set_breakpoints_replaces_the_template_lines() {
        let session = Arc::new(DebugSession::new());
        session.set_breakpoint("page.html", 2);
        let dispatcher = Dispatcher::new(Arc::clone(&session));

        let raw = indoc! {r#"
            {
                "seq": 7,
                "command": "setBreakpoints",
                "arguments": {
                    "source": { "path": "page.html" },
                    "breakpoints": [{ "line": 5 }, { "line": 3 }]
                }
            }
        "#};
        let response = dispatcher.handle_request(serde_json::from_str(raw).expect("request"));

        assert!(response.success);
        assert_eq!(response.request_seq, 7);
        assert_eq!(response.command, "setBreakpoints");
        let body = response.body.expect("body");
        assert_eq!(body["breakpoints"][0]["line"], 3);
        assert_eq!(body["breakpoints"][1]["line"], 5);
        assert!(session.get_breakpoint("page.html", 2).is_none());
        assert!(session.get_breakpoint("page.html", 5).is_some());
    }

    #[test]
    fn set_breakpoints_rejects_non_positive_lines() {
        let dispatcher = Dispatcher::new(Arc::new(DebugSession::new()));
        let response = dispatcher.handle_request(request(
            "setBreakpoints",
            json!({ "source": { "name": "page.html" }, "lines": [0] }),
        ));

        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("invalid line number 0"));
    }

    #[test]
    fn unknown_commands_fail_without_a_body() {
        let dispatcher = Dispatcher::new(Arc::new(DebugSession::new()));
        let response = dispatcher.handle_request(request("evaluate", json!({})));

        assert!(!response.success);
        assert!(response.body.is_none());
        assert_eq!(response.message.as_deref(), Some("unknown command: evaluate"));
    }

    #[test]
    fn malformed_arguments_fail() {
        let dispatcher = Dispatcher::new(Arc::new(DebugSession::new()));
        let response = dispatcher.handle_request(request("pause", json!({ "thread": 1 })));

        assert!(!response.success);
        assert!(
            response
                .message
                .as_deref()
                .is_some_and(|message| message.starts_with("invalid arguments"))
        );
    }

    #[test]
    fn commands_for_unknown_threads_succeed() {
        let dispatcher = Dispatcher::new(Arc::new(DebugSession::new()));

        for command in ["pause", "continue", "next", "stepIn", "stepOut"] {
            let response = dispatcher.handle_request(request(command, json!({ "threadId": 42 })));
            assert!(response.success, "{command} failed: {:?}", response.message);
        }

        let response = dispatcher.handle_request(request("state", json!({ "threadId": 42 })));
        assert_eq!(response.body, Some(json!({ "state": null })));
    }

    #[test]
    fn queries_on_unknown_handles_return_empty_lists() {
        let dispatcher = Dispatcher::new(Arc::new(DebugSession::new()));

        let response = dispatcher.handle_request(request("stackTrace", json!({ "threadId": 9 })));
        assert_eq!(
            response.body,
            Some(json!({ "stackFrames": [], "totalFrames": 0 }))
        );

        let response = dispatcher.handle_request(request("scopes", json!({ "frameId": 9 })));
        assert_eq!(response.body, Some(json!({ "scopes": [] })));

        let response =
            dispatcher.handle_request(request("variables", json!({ "variablesReference": 9 })));
        assert_eq!(response.body, Some(json!({ "variables": [] })));
    }

    #[test]
    fn responses_are_numbered_in_sequence() {
        let dispatcher = Dispatcher::new(Arc::new(DebugSession::new()));
        let first = dispatcher.handle_request(request("threads", json!({})));
        let second = dispatcher.handle_request(request("threads", json!({})));

        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_eq!(first.body, Some(json!({ "threads": [] })));
    }
}
