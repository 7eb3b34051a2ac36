/// Live notification channel
///
/// This module handles the broker connection that pushes notifications to the console.
///
/// Architecture:
/// 1. ConnectionManager: One live connection per receiver code, reconnect with linear backoff
/// 2. BrokerConnector: Transport seam (STOMP over WebSocket in production)
/// 3. NotificationDispatcher: Dedup set and synchronous fan-out to listeners
/// 4. messages: Validation of inbound push payloads

pub mod connector;
pub mod dispatcher;
pub mod manager;
pub mod messages;

pub use connector::{BrokerConnector, BrokerLink, LinkEvent, StompConnector};
pub use dispatcher::{DispatchOutcome, Listener, NotificationDispatcher, Subscription};
pub use manager::ConnectionManager;
pub use messages::{parse_push, PushError};
