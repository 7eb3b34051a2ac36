/// Native alerts for notifications that arrive while the console is in the background
use crate::config::AlertConfig;
use crate::models::Notification;
use crate::websocket::{ConnectionManager, Subscription};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Surface for OS-level alerts
pub trait SystemNotifier: Send + Sync {
    fn show(&self, notification: &Notification);
}

/// Writes alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl SystemNotifier for TracingNotifier {
    fn show(&self, notification: &Notification) {
        info!(
            target: "desktop_alert",
            id = %notification.id,
            kind = notification.notification_type.as_str(),
            title = %notification.title,
            "{}",
            notification.message
        );
    }
}

/// Alert permission, granted once per profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPermission {
    #[default]
    Default,
    Granted,
    Denied,
}

pub struct DesktopAlerts {
    notifier: Arc<dyn SystemNotifier>,
    permission: RwLock<AlertPermission>,
    focused: AtomicBool,
    shown: AtomicU64,
}

impl DesktopAlerts {
    pub fn new(notifier: Arc<dyn SystemNotifier>) -> Arc<Self> {
        Arc::new(Self {
            notifier,
            permission: RwLock::new(AlertPermission::Default),
            focused: AtomicBool::new(true),
            shown: AtomicU64::new(0),
        })
    }

    /// Settle permission and focus from configuration
    ///
    /// The permission prompt is answered by `config.desktop`, so a disabled
    /// flag records a denial rather than leaving the prompt pending.
    pub fn from_config(notifier: Arc<dyn SystemNotifier>, config: &AlertConfig) -> Arc<Self> {
        let alerts = Self::new(notifier);
        let permission = alerts.request_permission(|| config.desktop);
        alerts.set_focused(config.focused);
        info!(permission = ?permission, focused = config.focused, "desktop alerts configured");
        alerts
    }

    pub fn permission(&self) -> AlertPermission {
        *self.permission.read()
    }

    pub fn set_permission(&self, permission: AlertPermission) {
        *self.permission.write() = permission;
    }

    /// Ask once; later calls return the stored answer without prompting
    pub fn request_permission(&self, prompt: impl FnOnce() -> bool) -> AlertPermission {
        let mut permission = self.permission.write();
        if *permission == AlertPermission::Default {
            *permission = if prompt() {
                AlertPermission::Granted
            } else {
                AlertPermission::Denied
            };
            debug!(permission = ?*permission, "alert permission decided");
        }
        *permission
    }

    pub fn set_focused(&self, focused: bool) {
        self.focused.store(focused, Ordering::Relaxed);
    }

    pub fn is_focused(&self) -> bool {
        self.focused.load(Ordering::Relaxed)
    }

    pub fn shown_count(&self) -> u64 {
        self.shown.load(Ordering::Relaxed)
    }

    /// Show an alert when permitted and unfocused; returns whether one was shown
    pub fn handle(&self, notification: &Notification) -> bool {
        if self.permission() != AlertPermission::Granted || self.is_focused() {
            return false;
        }
        self.notifier.show(notification);
        self.shown.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Listen for delivered notifications on the live channel
    pub fn attach(self: &Arc<Self>, manager: &ConnectionManager) -> Subscription {
        let alerts = self.clone();
        manager.subscribe(Arc::new(move |notification: &Notification| {
            alerts.handle(notification);
        }))
    }
}
