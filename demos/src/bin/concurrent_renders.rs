//! Debugs several renders of the same template at once.
//!
//! Each render runs on its own thread and blocks when it reaches the
//! breakpoint. The main thread plays the client: it drains protocol events,
//! inspects every stopped render through protocol requests and resumes it,
//! optionally stepping over the next node first.
//!
//! ```text
//! cargo run --bin concurrent_renders -- --renders 4 --breakpoint 2 --step
//! ```

use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use qute_debug::{
    DebugSession, ExecutionId, MapContext, ResolveEvent, TemplateEvent, TraceListener,
    protocol::{Dispatcher, Event, EventForwarder, ProtocolMessage, Request, Sequence},
};
use serde_json::{Value, json};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

const PAGE: &str = "page.html";
const ROW: &str = "row.html";

/// Render a template concurrently under the debugger.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Opt {
    /// Number of concurrent renders.
    #[arg(long, short, default_value_t = 3)]
    renders: u64,

    /// Number of rows each render produces.
    #[arg(long, default_value_t = 4)]
    rows: u32,

    /// Line of `page.html` to break on.
    #[arg(long, short, default_value_t = 2)]
    breakpoint: u32,

    /// Step over once before resuming a stopped render.
    #[arg(long)]
    step: bool,

    /// Log level.
    #[arg(long, default_value_t = log::LevelFilter::Info)]
    log_level: log::LevelFilter,
}

/// Simulates a render of `page.html`, which includes `row.html` once per row.
fn render(session: Arc<DebugSession>, execution: ExecutionId, rows: u32) -> JoinHandle<()> {
    thread::spawn(move || {
        let page = TemplateEvent {
            execution,
            template_id: PAGE,
        };
        let globals = json!({ "title": "Inventory", "render": execution.0 });

        session.start_template(&page);
        for row in 0..rows {
            let line = row + 1;
            session.after_resolve(&ResolveEvent {
                execution,
                template_id: PAGE,
                line,
                description: "{#include row.html}",
                context: Arc::new(MapContext::from_globals(globals.clone())),
            });

            let nested = TemplateEvent {
                execution,
                template_id: ROW,
            };
            session.start_template(&nested);
            session.after_resolve(&ResolveEvent {
                execution,
                template_id: ROW,
                line: 1,
                description: "{item.name}",
                context: Arc::new(
                    MapContext::from_globals(globals.clone())
                        .with_local("item", json!({ "name": format!("item-{row}") })),
                ),
            });
            session.end_template(&nested);
        }
        session.end_template(&page);
    })
}

struct Client {
    dispatcher: Dispatcher,
    seq: i64,
}

impl Client {
    fn request(&mut self, command: &str, arguments: Value) -> Option<Value> {
        self.seq += 1;
        let response = self.dispatcher.handle_request(Request {
            seq: self.seq,
            command: command.to_string(),
            arguments: Some(arguments),
        });
        if !response.success {
            log::warn!(
                "{command} failed: {}",
                response.message.unwrap_or_default()
            );
            return None;
        }
        Some(response.body.unwrap_or(Value::Null))
    }

    /// Logs the top frame of a stopped render and its variables.
    fn inspect(&mut self, thread_id: &Value) {
        let Some(trace) = self.request("stackTrace", json!({ "threadId": thread_id, "levels": 1 }))
        else {
            return;
        };
        let frame = &trace["stackFrames"][0];
        log::info!(
            "render {thread_id} stopped at {}:{} `{}` ({} frames)",
            frame["source"]["path"].as_str().unwrap_or("?"),
            frame["line"],
            frame["name"].as_str().unwrap_or_default(),
            trace["totalFrames"],
        );

        let Some(scopes) = self.request("scopes", json!({ "frameId": frame["id"] })) else {
            return;
        };
        for scope in scopes["scopes"].as_array().into_iter().flatten() {
            let Some(variables) = self.request(
                "variables",
                json!({ "variablesReference": scope["variablesReference"] }),
            ) else {
                continue;
            };
            for variable in variables["variables"].as_array().into_iter().flatten() {
                log::info!(
                    "  [{}] {} = {}",
                    scope["name"].as_str().unwrap_or_default(),
                    variable["name"].as_str().unwrap_or_default(),
                    variable["value"].as_str().unwrap_or_default(),
                );
            }
        }
    }
}

fn drive(client: &mut Client, events: &Receiver<ProtocolMessage>, renders: u64, step: bool) {
    let mut exited = 0;
    while exited < renders {
        let event = match events.recv_timeout(Duration::from_secs(5)) {
            Ok(ProtocolMessage::Event(event)) => event,
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("no event for 5s, giving up");
                return;
            }
            Err(RecvTimeoutError::Disconnected) => return,
        };
        let Event { event, body, .. } = event;
        let body = body.unwrap_or(Value::Null);
        let thread_id = body["threadId"].clone();

        match (event.as_str(), body["reason"].as_str()) {
            ("thread", Some("started")) => log::info!("render {thread_id} started"),
            ("thread", Some("exited")) => {
                exited += 1;
                log::info!("render {thread_id} finished");
            }
            ("stopped", reason) => {
                log::info!("render {thread_id} suspended ({})", reason.unwrap_or("?"));
                client.inspect(&thread_id);
                let command = if step && reason == Some("breakpoint") {
                    "next"
                } else {
                    "continue"
                };
                client.request(command, json!({ "threadId": thread_id }));
            }
            _ => {}
        }
    }
}

#[allow(clippy::print_stderr)]
fn main() {
    let opt = Opt::parse();
    if let Err(err) = simple_logger::SimpleLogger::new()
        .with_level(opt.log_level)
        .init()
    {
        eprintln!("failed to install logger: {err}");
    }

    let session = Arc::new(DebugSession::new());
    let seq = Sequence::new();
    let (forwarder, events) = EventForwarder::new(seq.clone());
    session.add_listener(Arc::new(forwarder));

    let mut client = Client {
        dispatcher: Dispatcher::with_sequence(Arc::clone(&session), seq),
        seq: 0,
    };
    client.request(
        "setBreakpoints",
        json!({ "source": { "path": PAGE }, "breakpoints": [{ "line": opt.breakpoint }] }),
    );

    let handles: Vec<_> = (1..=opt.renders)
        .map(|execution| render(Arc::clone(&session), ExecutionId(execution), opt.rows))
        .collect();

    drive(&mut client, &events, opt.renders, opt.step);

    client.request("terminate", json!({}));
    for handle in handles {
        if handle.join().is_err() {
            log::error!("a render thread panicked");
        }
    }
}
