//! Event Bus (C1): broadcasts typed progress events to zero-or-more
//! observers without ever blocking the driver past a bounded buffer.
//!
//! Grounded on the per-run `broadcast::Sender<RunEvent>` fan-out in
//! `sa_gateway::runtime::runs::RunStore`, restructured per spec §4.1: the
//! teacher shares one `tokio::sync::broadcast` channel (which silently
//! drops the *oldest* unread item for a lagging subscriber); this bus
//! instead gives each subscriber its own bounded `mpsc` channel (spec's
//! preferred "fan-out to per-subscriber buffers"), and a full subscriber
//! buffer blocks `emit` only until a `CancelToken` fires, never the
//! producer indefinitely.

use std::sync::Arc;

use ac_domain::cancel::CancelToken;
use ac_domain::event::Event;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub const DEFAULT_BUFFER: usize = 100;

/// One subscriber's receive side.
pub struct Subscriber {
    rx: mpsc::Receiver<Event>,
}

impl Subscriber {
    /// Receive the next event, or `None` once the bus is closed and all
    /// buffered events have been drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Release this subscriber's buffer. Dropping the `Subscriber` has the
    /// same effect; `close` exists for callers that want it explicit.
    pub fn close(mut self) {
        self.rx.close();
    }
}

struct BusInner {
    subscribers: Vec<mpsc::Sender<Event>>,
    closed: bool,
}

/// The Event Bus itself. Cheap to clone (`Arc` internally) — every
/// component that emits or subscribes holds a clone.
#[derive(Clone)]
pub struct EventBus {
    buffer: usize,
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer,
            inner: Arc::new(Mutex::new(BusInner {
                subscribers: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Register a new subscriber with its own bounded buffer.
    ///
    /// If the bus is already closed, the returned subscriber immediately
    /// observes end-of-stream.
    pub fn subscribe(&self) -> Subscriber {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut inner = self.inner.lock();
        if !inner.closed {
            inner.subscribers.push(tx);
        }
        Subscriber { rx }
    }

    /// Publish `event` to every current subscriber, stamping its
    /// timestamp at emission time rather than trusting the producer.
    ///
    /// Fans out concurrently: a full buffer on one subscriber blocks only
    /// that subscriber's delivery, and only until `cancel` fires — it
    /// never holds up delivery to the others or the producer overall.
    pub async fn emit(&self, cancel: &CancelToken, event: Event) {
        let event = event.restamp(Utc::now());
        let senders: Vec<mpsc::Sender<Event>> = {
            let inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.subscribers.clone()
        };

        let mut stale = Vec::new();
        for (idx, tx) in senders.iter().enumerate() {
            tokio::select! {
                res = tx.send(event.clone()) => {
                    if res.is_err() {
                        stale.push(idx);
                    }
                }
                _ = cancel.cancelled() => {}
            }
        }

        if !stale.is_empty() {
            let mut inner = self.inner.lock();
            for &idx in stale.iter().rev() {
                if idx < inner.subscribers.len() {
                    inner.subscribers.remove(idx);
                }
            }
        }
    }

    /// Close the bus. Further `emit` calls are no-ops; existing
    /// subscribers drain their buffer then see end-of-stream.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done(content: &str) -> Event {
        Event::Done {
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_events_in_order() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe();
        let cancel = CancelToken::new();

        bus.emit(&cancel, done("one")).await;
        bus.emit(&cancel, done("two")).await;

        assert!(matches!(sub.recv().await, Some(Event::Done { content, .. }) if content == "one"));
        assert!(matches!(sub.recv().await, Some(Event::Done { content, .. }) if content == "two"));
    }

    #[tokio::test]
    async fn bus_stamps_timestamp_at_emit_not_producer() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe();
        let cancel = CancelToken::new();

        let stale_timestamp = Utc::now() - chrono::Duration::hours(1);
        let producer_event = Event::Message {
            content: "x".into(),
            timestamp: stale_timestamp,
        };
        bus.emit(&cancel, producer_event).await;

        let received = sub.recv().await.unwrap();
        assert!(received.timestamp() > stale_timestamp);
    }

    #[tokio::test]
    async fn fan_out_to_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        let cancel = CancelToken::new();

        bus.emit(&cancel, done("hi")).await;

        assert!(a.recv().await.is_some());
        assert!(b.recv().await.is_some());
    }

    #[tokio::test]
    async fn emit_on_full_buffer_unblocks_on_cancel() {
        let bus = EventBus::new(1);
        let _sub = bus.subscribe();
        let cancel = CancelToken::new();

        // Fill the one-slot buffer.
        bus.emit(&cancel, done("fills buffer")).await;

        cancel.cancel();
        // Buffer is still full; emit must return promptly because the
        // token is already cancelled, not hang waiting on send().
        tokio::time::timeout(std::time::Duration::from_millis(200), bus.emit(&cancel, done("second")))
            .await
            .expect("emit should not block past cancellation");
    }

    #[tokio::test]
    async fn subscribe_then_close_without_reading_does_not_leak() {
        let bus = EventBus::new(10);
        let sub = bus.subscribe();
        sub.close();
        assert_eq!(bus.subscriber_count(), 1); // still registered until next emit prunes it

        let cancel = CancelToken::new();
        bus.emit(&cancel, done("x")).await;
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn closed_bus_emits_are_noops_and_subscribers_see_end_of_stream() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe();
        bus.close();

        let cancel = CancelToken::new();
        bus.emit(&cancel, done("dropped")).await;

        assert!(sub.recv().await.is_none());
    }
}
