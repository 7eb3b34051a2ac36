/// Live Channel Connection Manager
///
/// Owns the one broker connection for the active receiver code.
/// Supports:
/// - Idempotent connect, with concurrent callers sharing one in-flight attempt
/// - Switching receivers (the old link is torn down first)
/// - Linear-backoff reconnect after failures, capped at a fixed attempt count
/// - Manual force-reconnect once the automatic schedule is exhausted
/// - Listener registration through the shared dispatcher
///
/// Constructed once at startup; clones share the same connection.
use super::connector::{BrokerConnector, BrokerLink, LinkEvent};
use super::dispatcher::{Listener, NotificationDispatcher, Subscription};
use crate::config::BrokerConfig;
use crate::error::Result;
use crate::metrics;
use crate::models::ConnectionState;
use parking_lot::Mutex;
use resilience::{with_timeout, TimeoutError};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shared handle to the live channel
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn BrokerConnector>,
    dispatcher: Arc<NotificationDispatcher>,
    config: BrokerConfig,
    state: Mutex<ManagerState>,
    status_tx: watch::Sender<ConnectionState>,
}

#[derive(Default)]
struct ManagerState {
    status: ConnectionState,
    receiver_code: Option<String>,
    /// Bumped on every new attempt and teardown; stale tasks compare against it
    generation: u64,
    /// Consecutive automatic reconnects since the last success
    attempts: u32,
    /// Outcome of the in-flight attempt, `None` until it settles
    pending: Option<watch::Receiver<Option<bool>>>,
    shutdown: Option<oneshot::Sender<()>>,
    reader: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

enum ConnectPlan {
    AlreadyConnected,
    Join(watch::Receiver<Option<bool>>),
    Attempt {
        generation: u64,
        done: watch::Sender<Option<bool>>,
    },
}

impl ConnectionManager {
    pub fn new(config: BrokerConfig, connector: Arc<dyn BrokerConnector>) -> Self {
        let (status_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                connector,
                dispatcher: Arc::new(NotificationDispatcher::new()),
                config,
                state: Mutex::new(ManagerState::default()),
                status_tx,
            }),
        }
    }

    /// Connect the live channel for `receiver_code`
    ///
    /// Resolves `true` once subscribed. Failures and timeouts resolve `false`
    /// and schedule a reconnect; they are never returned as errors.
    pub async fn connect(&self, receiver_code: &str) -> bool {
        let (generation, done) = match self.inner.plan_connect(receiver_code) {
            ConnectPlan::AlreadyConnected => return true,
            ConnectPlan::Join(rx) => return self.inner.join_pending(rx).await,
            ConnectPlan::Attempt { generation, done } => (generation, done),
        };

        let topic = self.inner.config.topic_for(receiver_code);
        debug!(receiver_code, topic = %topic, generation, "connecting live channel");

        let mut guard = AttemptGuard {
            inner: &self.inner,
            generation,
            settled: false,
        };
        let result = with_timeout(
            self.inner.config.connect_timeout,
            self.inner.connector.connect(&topic),
        )
        .await;
        guard.settled = true;

        let connected = Inner::finish_connect(&self.inner, generation, result);
        let _ = done.send(Some(connected));
        connected
    }

    /// Tear down the live channel
    ///
    /// Without `force` this is a no-op while any listener is registered.
    /// Returns whether the channel was torn down.
    pub fn disconnect(&self, force: bool) -> bool {
        let listeners = self.inner.dispatcher.listener_count();
        if !force && listeners > 0 {
            debug!(listeners, "disconnect skipped, listeners still registered");
            return false;
        }

        let mut state = self.inner.state.lock();
        self.inner.teardown_locked(&mut state);
        state.receiver_code = None;
        state.attempts = 0;
        info!(force, "live channel disconnected");
        true
    }

    /// Reset the backoff counter and reconnect immediately
    ///
    /// Resolves `false` when no receiver has been connected yet.
    pub async fn force_reconnect(&self) -> bool {
        let Some(receiver_code) = self.inner.prepare_force_reconnect() else {
            warn!("force reconnect requested without a receiver code");
            return false;
        };
        info!(receiver_code = %receiver_code, "forcing reconnect");
        self.connect(&receiver_code).await
    }

    /// Register a listener for deduplicated notifications
    pub fn subscribe(&self, listener: Listener) -> Subscription {
        self.inner.dispatcher.subscribe(listener)
    }

    pub fn status(&self) -> ConnectionState {
        self.inner.state.lock().status
    }

    /// Status feed for a connection indicator
    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.inner.status_tx.subscribe()
    }

    pub fn receiver_code(&self) -> Option<String> {
        self.inner.state.lock().receiver_code.clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state.lock().attempts
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.inner.dispatcher
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }
}

impl Inner {
    fn plan_connect(&self, receiver_code: &str) -> ConnectPlan {
        let mut state = self.state.lock();

        if state.receiver_code.as_deref() == Some(receiver_code) {
            match state.status {
                ConnectionState::Connected => return ConnectPlan::AlreadyConnected,
                ConnectionState::Connecting => {
                    if let Some(rx) = state.pending.clone() {
                        return ConnectPlan::Join(rx);
                    }
                }
                ConnectionState::Disconnected => {}
            }
        } else if let Some(previous) = state.receiver_code.clone() {
            info!(from = %previous, to = receiver_code, "switching receiver");
            self.teardown_locked(&mut state);
        }

        if let Some(task) = state.reconnect.take() {
            task.abort();
        }
        state.receiver_code = Some(receiver_code.to_string());
        state.generation += 1;

        let (done, rx) = watch::channel(None);
        state.pending = Some(rx);
        self.set_status_locked(&mut state, ConnectionState::Connecting);

        ConnectPlan::Attempt {
            generation: state.generation,
            done,
        }
    }

    async fn join_pending(&self, mut rx: watch::Receiver<Option<bool>>) -> bool {
        debug!("joining in-flight connect attempt");
        match tokio::time::timeout(self.config.connect_timeout, rx.wait_for(Option::is_some)).await
        {
            Ok(Ok(outcome)) => outcome.unwrap_or(false),
            Ok(Err(_)) => false,
            Err(_) => {
                warn!(
                    timeout_ms = self.config.connect_timeout.as_millis() as u64,
                    "timed out waiting for in-flight connect"
                );
                false
            }
        }
    }

    fn finish_connect(
        inner: &Arc<Inner>,
        generation: u64,
        result: std::result::Result<Result<BrokerLink>, TimeoutError>,
    ) -> bool {
        let mut state = inner.state.lock();
        if state.generation != generation {
            // Superseded by a disconnect or receiver switch; dropping the link closes it
            debug!(generation, "discarding stale connect result");
            return false;
        }
        state.pending = None;

        match result {
            Ok(Ok(link)) => {
                let (events, shutdown) = link.into_parts();
                state.attempts = 0;
                state.shutdown = Some(shutdown);
                state.reader = Some(tokio::spawn(read_loop(
                    Arc::downgrade(inner),
                    generation,
                    events,
                )));
                inner.set_status_locked(&mut state, ConnectionState::Connected);
                info!(
                    receiver_code = state.receiver_code.as_deref().unwrap_or_default(),
                    "live channel connected"
                );
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "live channel connect failed");
                inner.set_status_locked(&mut state, ConnectionState::Disconnected);
                Inner::schedule_reconnect_locked(inner, &mut state);
                false
            }
            Err(e) => {
                warn!(error = %e, "live channel handshake timed out");
                inner.set_status_locked(&mut state, ConnectionState::Disconnected);
                Inner::schedule_reconnect_locked(inner, &mut state);
                false
            }
        }
    }

    fn on_link_lost(inner: &Arc<Inner>, generation: u64, reason: Option<String>) {
        let mut state = inner.state.lock();
        if state.generation != generation || state.status != ConnectionState::Connected {
            return;
        }

        warn!(reason = reason.as_deref().unwrap_or("unknown"), "live channel lost");
        state.shutdown = None;
        // Called from the reader itself; detach rather than abort
        state.reader = None;
        inner.set_status_locked(&mut state, ConnectionState::Disconnected);
        Inner::schedule_reconnect_locked(inner, &mut state);
    }

    fn schedule_reconnect_locked(inner: &Arc<Inner>, state: &mut ManagerState) {
        let backoff = inner.config.reconnect;
        if backoff.is_exhausted(state.attempts) {
            warn!(
                attempts = state.attempts,
                "reconnect attempts exhausted, waiting for manual reconnect"
            );
            return;
        }
        let Some(receiver_code) = state.receiver_code.clone() else {
            return;
        };

        state.attempts += 1;
        let attempt = state.attempts;
        let Some(delay) = backoff.delay_for(attempt) else {
            return;
        };
        metrics::record_reconnect_attempt();
        info!(
            attempt,
            max_attempts = backoff.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );

        let generation = state.generation;
        let weak = Arc::downgrade(inner);
        if let Some(previous) = state.reconnect.take() {
            previous.abort();
        }
        state.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.claim_reconnect(generation) {
                return;
            }
            let manager = ConnectionManager { inner };
            manager.connect(&receiver_code).await;
        }));
    }

    /// Whether a scheduled reconnect for `generation` should still run
    fn claim_reconnect(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation || state.status != ConnectionState::Disconnected {
            return false;
        }
        // The running task is this one; connect() must not abort it
        state.reconnect = None;
        true
    }

    fn prepare_force_reconnect(&self) -> Option<String> {
        let mut state = self.state.lock();
        let receiver_code = state.receiver_code.clone()?;
        self.teardown_locked(&mut state);
        state.attempts = 0;
        Some(receiver_code)
    }

    fn teardown_locked(&self, state: &mut ManagerState) {
        state.generation += 1;
        state.pending = None;
        if let Some(task) = state.reconnect.take() {
            task.abort();
        }
        if let Some(task) = state.reader.take() {
            task.abort();
        }
        if let Some(shutdown) = state.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.set_status_locked(state, ConnectionState::Disconnected);
    }

    fn set_status_locked(&self, state: &mut ManagerState, status: ConnectionState) {
        if state.status == status {
            return;
        }
        debug!(from = %state.status, to = %status, "connection state changed");
        state.status = status;
        self.status_tx.send_replace(status);
        metrics::set_connection_state(status);
    }
}

/// Resets the status when the future driving an attempt is dropped mid-flight
struct AttemptGuard<'a> {
    inner: &'a Inner,
    generation: u64,
    settled: bool,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.inner.state.lock();
        if state.generation != self.generation {
            return;
        }
        debug!(generation = self.generation, "connect attempt abandoned");
        state.pending = None;
        self.inner.set_status_locked(&mut state, ConnectionState::Disconnected);
    }
}

async fn read_loop(
    inner: Weak<Inner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<LinkEvent>,
) {
    let reason = loop {
        match events.recv().await {
            Some(LinkEvent::Message(body)) => {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                inner.dispatcher.dispatch_raw(&body);
            }
            Some(LinkEvent::Closed(reason)) => break reason,
            None => break None,
        }
    };

    if let Some(inner) = inner.upgrade() {
        Inner::on_link_lost(&inner, generation, reason);
    }
}
