/// Local notification state for one receiver
///
/// Fed from two sides: the live channel prepends new notifications as they
/// arrive, and `refresh` merges the REST list. Both go through the shared
/// dispatcher so an id never shows up twice.
use crate::api::NotificationApi;
use crate::error::Result;
use crate::models::{Notification, NotificationId};
use crate::websocket::{ConnectionManager, NotificationDispatcher, Subscription};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

pub struct NotificationCenter {
    receiver_code: String,
    api: NotificationApi,
    dispatcher: Arc<NotificationDispatcher>,
    items: Arc<RwLock<Vec<Notification>>>,
    live: Option<Subscription>,
}

impl NotificationCenter {
    /// Create the center and start listening on the manager's live channel
    pub fn new(
        receiver_code: impl Into<String>,
        api: NotificationApi,
        manager: &ConnectionManager,
    ) -> Self {
        let items = Arc::new(RwLock::new(Vec::<Notification>::new()));
        let sink = items.clone();
        let live = manager.subscribe(Arc::new(move |notification: &Notification| {
            let mut items = sink.write();
            if !items.iter().any(|n| n.id == notification.id) {
                items.insert(0, notification.clone());
            }
        }));

        Self {
            receiver_code: receiver_code.into(),
            api,
            dispatcher: manager.dispatcher().clone(),
            items,
            live: Some(live),
        }
    }

    pub fn receiver_code(&self) -> &str {
        &self.receiver_code
    }

    /// Fetch the REST list and merge it into local state
    ///
    /// New entries are appended in the order returned; entries already held
    /// are replaced in place. Returns the number of new entries.
    pub async fn refresh(&self) -> Result<usize> {
        let fetched = self.api.fetch(&self.receiver_code).await?;

        let mut items = self.items.write();
        let mut added = 0;
        for notification in fetched {
            self.dispatcher.admit(&notification.id);
            match items.iter_mut().find(|n| n.id == notification.id) {
                Some(existing) => *existing = notification,
                None => {
                    items.push(notification);
                    added += 1;
                }
            }
        }
        info!(
            receiver_code = %self.receiver_code,
            added,
            total = items.len(),
            "notifications refreshed"
        );
        Ok(added)
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.items.read().clone()
    }

    pub fn get(&self, id: &NotificationId) -> Option<Notification> {
        self.items.read().iter().find(|n| &n.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.items.read().iter().filter(|n| !n.read).count()
    }

    /// Returns whether the notification was held locally
    pub async fn mark_read(&self, id: &NotificationId) -> Result<bool> {
        self.api.mark_read(id).await?;

        let mut items = self.items.write();
        let found = match items.iter_mut().find(|n| &n.id == id) {
            Some(notification) => {
                notification.mark_read();
                true
            }
            None => false,
        };
        debug!(id = %id, found, "notification marked read");
        Ok(found)
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        self.api.mark_all_read(&self.receiver_code).await?;

        for notification in self.items.write().iter_mut() {
            notification.mark_read();
        }
        Ok(())
    }

    /// Delete remotely, then drop the entry and its dedup record
    ///
    /// A later redelivery of the same id is treated as new.
    pub async fn delete(&self, id: &NotificationId) -> Result<bool> {
        self.api.delete(id).await?;

        let removed = {
            let mut items = self.items.write();
            let before = items.len();
            items.retain(|n| &n.id != id);
            items.len() != before
        };
        self.dispatcher.forget(id);
        debug!(id = %id, removed, "notification deleted");
        Ok(removed)
    }

    pub async fn clear_all(&self) -> Result<usize> {
        self.api.delete_all(&self.receiver_code).await?;

        let cleared: Vec<Notification> = std::mem::take(&mut *self.items.write());
        self.dispatcher.forget_all(cleared.iter().map(|n| &n.id));
        info!(
            receiver_code = %self.receiver_code,
            cleared = cleared.len(),
            "notifications cleared"
        );
        Ok(cleared.len())
    }
}

impl Drop for NotificationCenter {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            live.unsubscribe();
        }
    }
}
