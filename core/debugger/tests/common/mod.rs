//! Render simulation shared by the integration tests.

#![allow(dead_code, unreachable_pub)]

use crossbeam_channel::{Receiver, Sender};
use qute_debug::{
    DebugListener, DebugSession, ExecutionId, ListenerResult, MapContext, ResolveEvent,
    StoppedEvent, TemplateEvent, TerminateNotification, ThreadEvent, ThreadStatus, TraceListener,
    TrackerId,
};
use serde_json::json;
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

/// How long a test waits for something that should happen.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// How long a test waits to confirm that something does not happen.
pub const QUIET: Duration = Duration::from_millis(200);

/// One call the simulated engine makes.
#[derive(Debug, Clone)]
pub enum Step {
    Start(&'static str),
    Node(&'static str, u32),
    End(&'static str),
    /// Reports that the render got this far.
    Reached(Sender<()>),
    /// Blocks the render until the gate is opened or dropped.
    Gate(Receiver<()>),
}

/// Plays `steps` on a new thread as render `execution`.
pub fn render(session: &Arc<DebugSession>, execution: u64, steps: Vec<Step>) -> JoinHandle<()> {
    let session = Arc::clone(session);
    thread::spawn(move || {
        let execution = ExecutionId(execution);
        for step in steps {
            match step {
                Step::Start(template_id) => session.start_template(&TemplateEvent {
                    execution,
                    template_id,
                }),
                Step::Node(template_id, line) => {
                    let context = MapContext::from_globals(json!({ "user": "ada" }))
                        .with_local("line", json!(line));
                    session.after_resolve(&ResolveEvent {
                        execution,
                        template_id,
                        line,
                        description: "{user}",
                        context: Arc::new(context),
                    });
                }
                Step::End(template_id) => session.end_template(&TemplateEvent {
                    execution,
                    template_id,
                }),
                Step::Reached(signal) => {
                    let _ = signal.send(());
                }
                Step::Gate(gate) => {
                    let _ = gate.recv();
                }
            }
        }
    })
}

/// A whole template: start, one node per line, end.
pub fn template(template_id: &'static str, lines: &[u32]) -> Vec<Step> {
    let mut steps = vec![Step::Start(template_id)];
    steps.extend(lines.iter().map(|line| Step::Node(template_id, *line)));
    steps.push(Step::End(template_id));
    steps
}

/// Forwards notifications to channels so tests can wait on them.
pub struct Watcher {
    stopped: Sender<StoppedEvent>,
    threads: Sender<ThreadEvent>,
    terminated: Sender<()>,
}

/// Receiving ends of a [`Watcher`].
pub struct Observed {
    pub stopped: Receiver<StoppedEvent>,
    pub threads: Receiver<ThreadEvent>,
    pub terminated: Receiver<()>,
}

impl Watcher {
    pub fn new() -> (Arc<Self>, Observed) {
        let (stopped, stopped_rx) = crossbeam_channel::unbounded();
        let (threads, threads_rx) = crossbeam_channel::unbounded();
        let (terminated, terminated_rx) = crossbeam_channel::unbounded();
        (
            Arc::new(Self {
                stopped,
                threads,
                terminated,
            }),
            Observed {
                stopped: stopped_rx,
                threads: threads_rx,
                terminated: terminated_rx,
            },
        )
    }
}

impl DebugListener for Watcher {
    fn stopped(&self, event: &StoppedEvent) -> ListenerResult {
        self.stopped.send(*event)?;
        Ok(())
    }

    fn thread_changed(&self, event: &ThreadEvent) -> ListenerResult {
        self.threads.send(*event)?;
        Ok(())
    }

    fn terminated(&self, _event: &TerminateNotification) -> ListenerResult {
        self.terminated.send(())?;
        Ok(())
    }
}

impl Observed {
    pub fn next_stop(&self) -> StoppedEvent {
        self.stopped
            .recv_timeout(TIMEOUT)
            .expect("render did not stop")
    }

    pub fn assert_no_stop(&self) {
        assert!(
            self.stopped.recv_timeout(QUIET).is_err(),
            "render stopped unexpectedly"
        );
    }

    pub fn next_started(&self) -> TrackerId {
        loop {
            let event = self
                .threads
                .recv_timeout(TIMEOUT)
                .expect("no thread event");
            if event.status == ThreadStatus::Started {
                return event.tracker;
            }
        }
    }
}

/// A session with a watcher attached.
pub fn observed_session() -> (Arc<DebugSession>, Observed) {
    let session = Arc::new(DebugSession::new());
    let (watcher, observed) = Watcher::new();
    session.add_listener(watcher);
    (session, observed)
}

pub fn join(render: JoinHandle<()>) {
    render.join().expect("render thread panicked");
}
