/// Notification deduplication and fan-out
///
/// Every inbound notification passes through here. An id is surfaced to
/// listeners at most once per session: the first sighting is recorded in the
/// seen set and fanned out synchronously, later sightings are dropped.
use crate::metrics;
use crate::models::{Notification, NotificationId};
use crate::websocket::messages::parse_push;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Callback invoked for each deduplicated notification
pub type Listener = Arc<dyn Fn(&Notification) + Send + Sync>;

/// What happened to an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Duplicate,
    Malformed,
}

struct Registration {
    listener: Listener,
    active: AtomicBool,
    /// Held for the duration of each call. Reentrant, so a listener can
    /// unsubscribe itself while running.
    gate: ReentrantMutex<()>,
}

pub struct NotificationDispatcher {
    seen: Mutex<HashSet<NotificationId>>,
    /// Keyed by registration order
    listeners: RwLock<BTreeMap<u64, Arc<Registration>>>,
    next_listener_id: AtomicU64,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            listeners: RwLock::new(BTreeMap::new()),
            next_listener_id: AtomicU64::new(0),
        }
    }

    /// Register a listener
    ///
    /// Listeners run on the task that delivers the message, with no table
    /// lock held, so a callback may subscribe or unsubscribe (itself
    /// included). A listener added during a fan-out first sees the next
    /// message.
    pub fn subscribe(self: &Arc<Self>, listener: Listener) -> Subscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let registration = Registration {
            listener,
            active: AtomicBool::new(true),
            gate: ReentrantMutex::new(()),
        };
        self.listeners.write().insert(id, Arc::new(registration));
        debug!(listener_id = id, "listener registered");
        Subscription {
            dispatcher: Arc::downgrade(self),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Handle a raw MESSAGE body from the broker
    pub fn dispatch_raw(&self, body: &str) -> DispatchOutcome {
        match parse_push(body) {
            Ok(notification) => self.dispatch(notification),
            Err(e) => {
                debug!(error = %e, "dropping malformed push message");
                metrics::record_malformed();
                DispatchOutcome::Malformed
            }
        }
    }

    pub fn dispatch(&self, notification: Notification) -> DispatchOutcome {
        if !self.admit(&notification.id) {
            trace!(id = %notification.id, "duplicate notification dropped");
            metrics::record_duplicate();
            return DispatchOutcome::Duplicate;
        }

        let snapshot: Vec<Arc<Registration>> = self.listeners.read().values().cloned().collect();
        debug!(
            id = %notification.id,
            listeners = snapshot.len(),
            "fanning out notification"
        );
        for registration in &snapshot {
            let _gate = registration.gate.lock();
            // Unsubscribed earlier in this fan-out
            if registration.active.load(Ordering::Acquire) {
                (registration.listener)(&notification);
            }
        }
        metrics::record_delivered();
        DispatchOutcome::Delivered
    }

    /// Record an id as seen without notifying listeners
    ///
    /// Returns `true` when the id was new.
    pub fn admit(&self, id: &NotificationId) -> bool {
        self.seen.lock().insert(id.clone())
    }

    /// Drop an id from the seen set; a redelivery would then surface again
    pub fn forget(&self, id: &NotificationId) -> bool {
        self.seen.lock().remove(id)
    }

    pub fn forget_all<'a>(&self, ids: impl IntoIterator<Item = &'a NotificationId>) {
        let mut seen = self.seen.lock();
        for id in ids {
            seen.remove(id);
        }
    }

    pub fn is_seen(&self, id: &NotificationId) -> bool {
        self.seen.lock().contains(id)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.lock().len()
    }

    fn remove_listener(&self, id: u64) -> bool {
        let Some(registration) = self.listeners.write().remove(&id) else {
            return false;
        };
        // Waits out a call running on another thread
        let _gate = registration.gate.lock();
        registration.active.store(false, Ordering::Release);
        true
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `subscribe`
///
/// Once `unsubscribe` returns, the listener is never invoked again. Called
/// from another thread, it waits for a call already in progress to finish.
#[must_use = "dropping a Subscription keeps the listener registered; call unsubscribe()"]
pub struct Subscription {
    dispatcher: Weak<NotificationDispatcher>,
    id: u64,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) -> bool {
        match self.dispatcher.upgrade() {
            Some(dispatcher) => {
                let removed = dispatcher.remove_listener(self.id);
                debug!(listener_id = self.id, removed, "listener unregistered");
                removed
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> (Listener, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Listener = Arc::new(move |n: &Notification| {
            sink.lock().push(n.id.to_string());
        });
        (listener, seen)
    }

    #[test]
    fn test_first_delivery_fans_out() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let (listener, received) = collector();
        let _sub = dispatcher.subscribe(listener);

        let outcome = dispatcher.dispatch(Notification::new("1", "t", "m"));
        assert_eq!(outcome, DispatchOutcome::Delivered);
        assert_eq!(*received.lock(), vec!["1".to_string()]);
    }

    #[test]
    fn test_duplicate_is_dropped() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let (listener, received) = collector();
        let _sub = dispatcher.subscribe(listener);

        dispatcher.dispatch(Notification::new("1", "t", "m"));
        let outcome = dispatcher.dispatch_raw(r#"{"id":1,"title":"again"}"#);

        assert_eq!(outcome, DispatchOutcome::Duplicate);
        assert_eq!(received.lock().len(), 1);
    }

    #[test]
    fn test_admitted_id_is_not_fanned_out_later() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let (listener, received) = collector();
        let _sub = dispatcher.subscribe(listener);

        assert!(dispatcher.admit(&NotificationId::from("5")));
        assert_eq!(
            dispatcher.dispatch(Notification::new("5", "t", "m")),
            DispatchOutcome::Duplicate
        );
        assert!(received.lock().is_empty());
    }

    #[test]
    fn test_forgotten_id_surfaces_again() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let (listener, received) = collector();
        let _sub = dispatcher.subscribe(listener);

        dispatcher.dispatch(Notification::new("9", "t", "m"));
        assert!(dispatcher.forget(&NotificationId::from("9")));
        dispatcher.dispatch(Notification::new("9", "t", "m"));

        assert_eq!(received.lock().len(), 2);
    }

    #[test]
    fn test_malformed_messages_are_dropped() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let (listener, received) = collector();
        let _sub = dispatcher.subscribe(listener);

        assert_eq!(dispatcher.dispatch_raw("{"), DispatchOutcome::Malformed);
        assert_eq!(
            dispatcher.dispatch_raw(r#"{"title":"x"}"#),
            DispatchOutcome::Malformed
        );
        assert!(received.lock().is_empty());
        assert_eq!(dispatcher.seen_count(), 0);
    }

    #[test]
    fn test_every_listener_receives_in_registration_order() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut subs = Vec::new();
        for tag in ["badge", "dropdown", "alerts"] {
            let order = order.clone();
            subs.push(dispatcher.subscribe(Arc::new(move |_: &Notification| {
                order.lock().push(tag);
            })));
        }

        dispatcher.dispatch(Notification::new("1", "t", "m"));
        assert_eq!(*order.lock(), vec!["badge", "dropdown", "alerts"]);
    }

    #[test]
    fn test_unsubscribed_listener_receives_nothing() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let (listener, received) = collector();
        let sub = dispatcher.subscribe(listener);

        dispatcher.dispatch(Notification::new("1", "t", "m"));
        assert!(sub.unsubscribe());
        dispatcher.dispatch(Notification::new("2", "t", "m"));

        assert_eq!(*received.lock(), vec!["1".to_string()]);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn test_listener_can_unsubscribe_itself() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let calls = Arc::new(Mutex::new(0usize));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let (counter, own) = (calls.clone(), slot.clone());
        let sub = dispatcher.subscribe(Arc::new(move |_: &Notification| {
            *counter.lock() += 1;
            if let Some(sub) = own.lock().take() {
                sub.unsubscribe();
            }
        }));
        *slot.lock() = Some(sub);

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let worker = dispatcher.clone();
        std::thread::spawn(move || {
            worker.dispatch(Notification::new("1", "t", "m"));
            worker.dispatch(Notification::new("2", "t", "m"));
            let _ = done_tx.send(());
        });

        done_rx
            .recv_timeout(std::time::Duration::from_secs(3))
            .expect("fan-out blocked on a self-unsubscribing listener");
        assert_eq!(*calls.lock(), 1);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn test_listener_removed_mid_fan_out_is_skipped() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let (log, target) = (order.clone(), victim.clone());
        let _first = dispatcher.subscribe(Arc::new(move |_: &Notification| {
            log.lock().push("first");
            if let Some(sub) = target.lock().take() {
                sub.unsubscribe();
            }
        }));
        let log = order.clone();
        *victim.lock() = Some(dispatcher.subscribe(Arc::new(move |_: &Notification| {
            log.lock().push("second");
        })));

        dispatcher.dispatch(Notification::new("1", "t", "m"));
        assert_eq!(*order.lock(), vec!["first"]);
    }

    #[test]
    fn test_listener_added_during_fan_out_sees_next_message() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let (late, received) = collector();
        let pending = Arc::new(Mutex::new(Some(late)));
        let added = Arc::new(Mutex::new(Vec::new()));

        let (weak, slot, keep) = (Arc::downgrade(&dispatcher), pending.clone(), added.clone());
        let _adder = dispatcher.subscribe(Arc::new(move |_: &Notification| {
            if let (Some(dispatcher), Some(listener)) = (weak.upgrade(), slot.lock().take()) {
                keep.lock().push(dispatcher.subscribe(listener));
            }
        }));

        dispatcher.dispatch(Notification::new("1", "t", "m"));
        assert!(received.lock().is_empty());

        dispatcher.dispatch(Notification::new("2", "t", "m"));
        assert_eq!(*received.lock(), vec!["2".to_string()]);
        assert_eq!(dispatcher.listener_count(), 2);
    }

    #[test]
    fn test_unsubscribe_waits_for_running_call() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let finished = Arc::new(AtomicBool::new(false));
        let (started_tx, started_rx) = std::sync::mpsc::channel();

        let flag = finished.clone();
        let started_tx = Mutex::new(started_tx);
        let sub = dispatcher.subscribe(Arc::new(move |_: &Notification| {
            let _ = started_tx.lock().send(());
            std::thread::sleep(std::time::Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        }));

        let worker = dispatcher.clone();
        let handle = std::thread::spawn(move || {
            worker.dispatch(Notification::new("1", "t", "m"));
        });

        started_rx.recv().unwrap();
        assert!(sub.unsubscribe());
        assert!(finished.load(Ordering::SeqCst));
        handle.join().unwrap();
    }

    #[test]
    fn test_unsubscribe_after_dispatcher_dropped() {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let (listener, _) = collector();
        let sub = dispatcher.subscribe(listener);
        drop(dispatcher);
        assert!(!sub.unsubscribe());
    }
}
