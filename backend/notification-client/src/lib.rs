pub mod api;
pub mod center;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod notifier;
pub mod session;
pub mod stomp;
pub mod websocket;

pub use api::{ApiClient, ApprovalClient, NotificationApi};
pub use center::NotificationCenter;
pub use config::Config;
pub use error::{ClientError, Result};
pub use models::{ConnectionState, Notification, NotificationId, NotificationType};
pub use notifier::{AlertPermission, DesktopAlerts, SystemNotifier, TracingNotifier};
pub use session::{AuthSession, SessionStore};
pub use websocket::{ConnectionManager, StompConnector, Subscription};
