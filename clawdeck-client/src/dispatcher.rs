//! Event dispatch.
//!
//! Handlers are registered per event name; the name `*` receives every
//! event. Dispatch calls the exact-name handlers first, then the wildcard
//! handlers. A handler registered under both runs twice. Handler lists are
//! snapshotted before the calls, so handlers may subscribe or unsubscribe
//! from inside a callback.

use crate::stats::ClientStats;
use clawdeck_protocol::{EventFrame, WILDCARD_EVENT};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

/// Callback invoked for each matching event.
pub type EventHandler = Arc<dyn Fn(&EventFrame) + Send + Sync>;

/// Handlers keyed by name, each with a registration id.
pub(crate) struct Registry<H> {
    inner: Arc<Mutex<RegistryInner<H>>>,
}

struct RegistryInner<H> {
    next_id: u64,
    entries: HashMap<String, Vec<(u64, H)>>,
}

impl<H: Clone + Send + 'static> Registry<H> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                next_id: 0,
                entries: HashMap::new(),
            })),
        }
    }

    pub(crate) fn insert(&self, key: &str, handler: H) -> Subscription {
        let id = {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner
                .entries
                .entry(key.to_string())
                .or_default()
                .push((id, handler));
            id
        };

        let weak: Weak<Mutex<RegistryInner<H>>> = Arc::downgrade(&self.inner);
        let key = key.to_string();
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.lock();
                if let Some(list) = inner.entries.get_mut(&key) {
                    list.retain(|(entry, _)| *entry != id);
                    if list.is_empty() {
                        inner.entries.remove(&key);
                    }
                }
            }
        })
    }

    pub(crate) fn snapshot(&self, key: &str) -> Vec<H> {
        self.inner
            .lock()
            .entries
            .get(key)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn len(&self, key: &str) -> usize {
        self.inner.lock().entries.get(key).map_or(0, Vec::len)
    }
}

/// Handle to a registered handler.
///
/// The handler stays registered until [`Subscription::unsubscribe`] is
/// called; dropping the handle does not remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// Removes the handler. Removes only this registration, even if the
    /// same callback was registered more than once.
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

/// Publish/subscribe registry for gateway events.
pub struct Dispatcher {
    handlers: Registry<EventHandler>,
    events: broadcast::Sender<EventFrame>,
    stats: Arc<ClientStats>,
}

impl Dispatcher {
    pub fn new(capacity: usize, stats: Arc<ClientStats>) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            handlers: Registry::new(),
            events,
            stats,
        }
    }

    /// Registers `handler` for `event`, or for every event if `event` is `*`.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&EventFrame) + Send + Sync + 'static,
    {
        self.handlers.insert(event, Arc::new(handler))
    }

    /// Returns a receiver of every event, for async consumers.
    pub fn subscribe(&self) -> broadcast::Receiver<EventFrame> {
        self.events.subscribe()
    }

    /// Number of handlers registered under `event` exactly.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.len(event)
    }

    /// Delivers one event. Returns the number of handlers that ran to
    /// completion.
    pub fn dispatch(&self, frame: &EventFrame) -> usize {
        self.stats.event_dispatched();
        tracing::debug!("Dispatching event {} seq={:?}", frame.event, frame.seq);

        let mut handlers = self.handlers.snapshot(&frame.event);
        handlers.extend(self.handlers.snapshot(WILDCARD_EVENT));

        let mut completed = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(frame))) {
                Ok(()) => completed += 1,
                Err(_) => {
                    self.stats.handler_panicked();
                    tracing::warn!("Event handler for {} panicked", frame.event);
                }
            }
        }

        // No receivers is fine.
        let _ = self.events.send(frame.clone());
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(16, Arc::new(ClientStats::default()))
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> impl Fn(&EventFrame) + Send + Sync {
        let log = log.clone();
        let tag = tag.to_string();
        move |frame: &EventFrame| log.lock().push(format!("{}:{}", tag, frame.event))
    }

    #[test]
    fn test_exact_then_wildcard() {
        let d = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = d.on("*", recorder(&log, "wild"));
        let _b = d.on("agent.started", recorder(&log, "started"));
        let _c = d.on("agent.stopped", recorder(&log, "stopped"));

        let ran = d.dispatch(&EventFrame::new("agent.started", json!({})));
        assert_eq!(ran, 2);
        assert_eq!(
            *log.lock(),
            vec!["started:agent.started", "wild:agent.started"]
        );
    }

    #[test]
    fn test_no_dedup_across_names() {
        let d = dispatcher();
        let count = Arc::new(AtomicUsize::new(0));
        let handler = {
            let count = count.clone();
            move |_: &EventFrame| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        };
        let _a = d.on("log", handler.clone());
        let _b = d.on("*", handler);

        d.dispatch(&EventFrame::new("log", json!({})));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let d = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = d.on("heartbeat", |_: &EventFrame| panic!("boom"));
        let _b = d.on("heartbeat", recorder(&log, "after"));
        let _c = d.on("*", recorder(&log, "wild"));

        let ran = d.dispatch(&EventFrame::new("heartbeat", json!(null)));
        assert_eq!(ran, 2);
        assert_eq!(log.lock().len(), 2);
        assert_eq!(d.stats.snapshot().handler_panics, 1);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_entry() {
        let d = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = d.on("cron.run", recorder(&log, "first"));
        let _second = d.on("cron.run", recorder(&log, "second"));
        assert_eq!(d.handler_count("cron.run"), 2);

        first.unsubscribe();
        assert_eq!(d.handler_count("cron.run"), 1);

        d.dispatch(&EventFrame::new("cron.run", json!({})));
        assert_eq!(*log.lock(), vec!["second:cron.run"]);
    }

    #[test]
    fn test_handler_can_unsubscribe_during_dispatch() {
        let d = Arc::new(dispatcher());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let count = Arc::new(AtomicUsize::new(0));

        let sub = {
            let slot = slot.clone();
            let count = count.clone();
            d.on("log", move |_: &EventFrame| {
                count.fetch_add(1, Ordering::SeqCst);
                if let Some(sub) = slot.lock().take() {
                    sub.unsubscribe();
                }
            })
        };
        *slot.lock() = Some(sub);

        d.dispatch(&EventFrame::new("log", json!({})));
        d.dispatch(&EventFrame::new("log", json!({})));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broadcast_subscribers_receive_events() {
        let d = dispatcher();
        let mut rx = d.subscribe();
        d.dispatch(&EventFrame::new("session.created", json!({"id": "s1"})).with_seq(3));

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.event, "session.created");
        assert_eq!(frame.seq, Some(3));
    }
}
