//! Notification forwarding
//!
//! [`EventForwarder`] is a [`DebugListener`] that turns notifications into
//! protocol events and queues them on a channel for the transport to drain.

use super::{
    Event, ProtocolMessage, Sequence,
    messages::{StoppedEventBody, TerminatedEventBody, ThreadEventBody},
};
use crate::event::{
    DebugListener, ListenerResult, StoppedEvent, TerminateNotification, ThreadEvent,
};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;

/// Queues `stopped`, `thread` and `terminated` events.
///
/// Events are queued in the order of their sequence numbers, whichever
/// render thread produced them.
#[derive(Debug)]
pub struct EventForwarder {
    seq: Sequence,
    sender: Mutex<Sender<ProtocolMessage>>,
}

impl EventForwarder {
    /// Creates a forwarder and the receiving end of its queue.
    #[must_use]
    pub fn new(seq: Sequence) -> (Self, Receiver<ProtocolMessage>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (
            Self {
                seq,
                sender: Mutex::new(sender),
            },
            receiver,
        )
    }

    /// Numbers and queues an event message
    fn send<T: Serialize>(&self, event: &str, body: &T) -> ListenerResult {
        let body = serde_json::to_value(body)?;
        let sender = self.sender.lock();
        sender.send(ProtocolMessage::Event(Event {
            seq: self.seq.next(),
            event: event.to_string(),
            body: Some(body),
        }))?;
        Ok(())
    }
}

impl DebugListener for EventForwarder {
    fn stopped(&self, event: &StoppedEvent) -> ListenerResult {
        self.send(
            "stopped",
            &StoppedEventBody {
                reason: event.reason.as_str().to_string(),
                thread_id: event.tracker,
                all_threads_stopped: false,
            },
        )
    }

    fn thread_changed(&self, event: &ThreadEvent) -> ListenerResult {
        self.send(
            "thread",
            &ThreadEventBody {
                reason: event.status.as_str().to_string(),
                thread_id: event.tracker,
            },
        )
    }

    fn terminated(&self, _event: &TerminateNotification) -> ListenerResult {
        self.send("terminated", &TerminatedEventBody {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::{StopReason, ThreadStatus},
        tracker::TrackerId,
    };
    use serde_json::{Value, json};
    use std::{sync::Arc, thread};

    #[test]
    fn notifications_become_events() {
        let (forwarder, events) = EventForwarder::new(Sequence::new());

        forwarder
            .thread_changed(&ThreadEvent {
                tracker: TrackerId(1),
                status: ThreadStatus::Started,
            })
            .expect("queued");
        forwarder
            .stopped(&StoppedEvent {
                tracker: TrackerId(1),
                reason: StopReason::Breakpoint,
            })
            .expect("queued");
        forwarder
            .terminated(&TerminateNotification)
            .expect("queued");

        let events: Vec<Value> = events
            .try_iter()
            .map(|message| serde_json::to_value(message).expect("encodable"))
            .collect();
        assert_eq!(
            events,
            vec![
                json!({
                    "type": "event",
                    "seq": 1,
                    "event": "thread",
                    "body": { "reason": "started", "threadId": 1 }
                }),
                json!({
                    "type": "event",
                    "seq": 2,
                    "event": "stopped",
                    "body": { "reason": "breakpoint", "threadId": 1, "allThreadsStopped": false }
                }),
                json!({ "type": "event", "seq": 3, "event": "terminated", "body": {} }),
            ]
        );
    }

    #[test]
    fn a_dropped_receiver_is_a_listener_failure() {
        let (forwarder, events) = EventForwarder::new(Sequence::new());
        drop(events);

        assert!(forwarder.terminated(&TerminateNotification).is_err());
    }

    #[test]
    fn events_from_many_threads_are_queued_in_sequence_order() {
        let (forwarder, events) = EventForwarder::new(Sequence::new());
        let forwarder = Arc::new(forwarder);

        let handles: Vec<_> = (1..=8)
            .map(|tracker| {
                let forwarder = Arc::clone(&forwarder);
                thread::spawn(move || {
                    for _ in 0..100 {
                        forwarder
                            .thread_changed(&ThreadEvent {
                                tracker: TrackerId(tracker),
                                status: ThreadStatus::Started,
                            })
                            .expect("queued");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("sender thread panicked");
        }

        let seqs: Vec<i64> = events
            .try_iter()
            .map(|message| match message {
                ProtocolMessage::Event(event) => event.seq,
                other => panic!("unexpected message {other:?}"),
            })
            .collect();
        assert_eq!(seqs, (1..=800).collect::<Vec<i64>>());
    }
}
