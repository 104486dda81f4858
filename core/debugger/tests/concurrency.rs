//! Several renders debugged at once.

mod common;

use common::{Step, TIMEOUT, Watcher, join, observed_session, render, template};
use parking_lot::Mutex;
use qute_debug::{
    DebugError, DebugListener, DebugSession, ListenerResult, StopReason, StoppedEvent,
    ThreadStatus, TrackerState,
};
use std::{
    collections::BTreeSet,
    sync::{Arc, Weak},
    time::Instant,
};

/// Resumes every render from inside its `stopped` notification.
struct ResumeOnStop {
    session: Weak<DebugSession>,
    results: Mutex<Vec<Result<(), DebugError>>>,
}

impl DebugListener for ResumeOnStop {
    fn stopped(&self, event: &StoppedEvent) -> ListenerResult {
        if let Some(session) = self.session.upgrade() {
            let result = session.resume(event.tracker);
            self.results.lock().push(result);
        }
        Ok(())
    }
}

#[test]
fn suspending_one_render_does_not_block_another() {
    let (session, observed) = observed_session();
    session.set_breakpoint("a.html", 1);

    let first = render(&session, 1, template("a.html", &[1, 2]));
    let stopped = observed.next_stop().tracker;

    // Runs to completion while the first render is parked.
    join(render(&session, 2, template("b.html", &[1, 2, 3])));
    observed.assert_no_stop();

    let threads = session.threads();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].id, stopped);
    assert_eq!(threads[0].state, TrackerState::Suspended);

    session.resume(stopped).expect("resume");
    join(first);
    assert!(session.threads().is_empty());
}

#[test]
fn renders_of_the_same_template_suspend_independently() {
    let (session, observed) = observed_session();
    session.set_breakpoint("page.html", 2);

    let renders: Vec<_> = (1..=3)
        .map(|execution| render(&session, execution, template("page.html", &[1, 2, 3])))
        .collect();

    let stopped: BTreeSet<_> = (0..3).map(|_| observed.next_stop().tracker).collect();
    assert_eq!(stopped.len(), 3);
    for id in &stopped {
        assert_eq!(session.get_state(*id), Some(TrackerState::Suspended));
    }

    let mut remaining = stopped.iter();
    let resumed = *remaining.next().expect("three renders stopped");
    session.resume(resumed).expect("resume");
    for id in remaining {
        assert_eq!(session.get_state(*id), Some(TrackerState::Suspended));
        assert_eq!(session.get_stack_trace(*id)[0].line(), 2);
    }

    for id in stopped.iter().skip(1) {
        session.resume(*id).expect("resume");
    }
    renders.into_iter().for_each(join);
    assert!(session.threads().is_empty());
}

#[test]
fn thread_events_bracket_each_render() {
    let (session, observed) = observed_session();

    join(render(&session, 1, template("a.html", &[1])));
    join(render(&session, 2, template("b.html", &[1])));

    let events: Vec<_> = observed.threads.try_iter().collect();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0].status, ThreadStatus::Started);
    assert_eq!(events[1].status, ThreadStatus::Exited);
    assert_eq!(events[0].tracker, events[1].tracker);
    assert_ne!(events[1].tracker, events[2].tracker);
}

#[test]
fn removing_the_last_listener_releases_suspended_renders() {
    let session = Arc::new(DebugSession::new());
    let (watcher, observed) = Watcher::new();
    let listener = session.add_listener(watcher);
    session.set_breakpoint("page.html", 1);

    let handle = render(&session, 1, template("page.html", &[1, 2]));
    let stop = observed.next_stop();
    assert_eq!(stop.reason, StopReason::Breakpoint);

    assert!(session.remove_listener(listener));
    join(handle);
    assert!(session.threads().is_empty());
}

#[test]
fn suspended_renders_can_outlive_their_listeners() {
    let session = Arc::new(
        DebugSession::builder()
            .release_when_unobserved(false)
            .build(),
    );
    let (watcher, observed) = Watcher::new();
    let listener = session.add_listener(watcher);
    session.set_breakpoint("page.html", 1);

    let handle = render(&session, 1, template("page.html", &[1, 2]));
    let tracker = observed.next_stop().tracker;

    assert!(session.remove_listener(listener));
    assert_eq!(session.get_state(tracker), Some(TrackerState::Suspended));

    session.resume(tracker).expect("resume");
    join(handle);
}

#[test]
fn terminate_releases_every_render() {
    let (session, observed) = observed_session();
    session.set_breakpoint("page.html", 1);

    let renders: Vec<_> = (1..=4)
        .map(|execution| render(&session, execution, template("page.html", &[1, 2])))
        .collect();
    for _ in 0..4 {
        observed.next_stop();
    }

    session.terminate();
    renders.into_iter().for_each(join);

    assert!(session.threads().is_empty());
    assert_eq!(observed.terminated.try_iter().count(), 1);
}

#[test]
fn listener_can_resume_from_its_stopped_callback() {
    let session = Arc::new(DebugSession::new());
    let listener = Arc::new(ResumeOnStop {
        session: Arc::downgrade(&session),
        results: Mutex::new(Vec::new()),
    });
    session.add_listener(listener.clone());
    session.set_breakpoint("page.html", 1);
    session.set_breakpoint("page.html", 3);

    let (done, done_rx) = crossbeam_channel::bounded(1);
    let mut steps = template("page.html", &[1, 2, 3]);
    steps.push(Step::Reached(done));
    let handle = render(&session, 1, steps);

    done_rx
        .recv_timeout(TIMEOUT)
        .expect("render stayed suspended");
    join(handle);

    assert_eq!(*listener.results.lock(), vec![Ok(()), Ok(())]);
    assert!(session.threads().is_empty());
}

#[test]
fn terminate_racing_a_starting_render_never_strands_it() {
    for round in 0..50 {
        let (session, observed) = observed_session();
        session.set_breakpoint("page.html", 2);

        let (done, done_rx) = crossbeam_channel::bounded(1);
        let mut steps = template("page.html", &[1, 2, 3]);
        steps.push(Step::Reached(done));
        let handle = render(&session, round, steps);

        session.terminate();
        session.set_breakpoint("page.html", 3);

        // Every stop reported from here on must be resumable.
        let deadline = Instant::now() + TIMEOUT;
        loop {
            crossbeam_channel::select! {
                recv(done_rx) -> _ => break,
                recv(observed.stopped) -> stop => {
                    let stop = stop.expect("session still has a listener");
                    session.resume(stop.tracker).expect("resume");
                }
                default(deadline.saturating_duration_since(Instant::now())) => {
                    panic!("render {round} was left suspended");
                }
            }
        }
        join(handle);
        assert!(session.threads().is_empty(), "round {round}");
    }
}
