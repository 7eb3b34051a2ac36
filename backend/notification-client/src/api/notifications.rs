use super::client::ApiClient;
use crate::error::{ClientError, Result};
use crate::models::{Notification, NotificationId};
use reqwest::Method;
use resilience::{with_retry_if, RetryError};
use serde_json::Value;
use tracing::{debug, warn};
use urlencoding::encode;

/// REST companion calls for the notification list
#[derive(Clone)]
pub struct NotificationApi {
    client: ApiClient,
}

impl NotificationApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// List notifications for a receiver, in the order the server returns them
    ///
    /// Retried on 5xx and transport errors.
    pub async fn fetch(&self, receiver_code: &str) -> Result<Vec<Notification>> {
        let path = format!("notifications/receiver/{}", encode(receiver_code));

        let response = with_retry_if(
            self.client.retry_config().clone(),
            || self.client.execute(Method::GET, &path, "fetch_notifications"),
            ClientError::is_retryable,
        )
        .await
        .map_err(RetryError::into_inner)?;

        let body = response.text().await?;
        let notifications = parse_list(&body)?;
        debug!(
            receiver_code,
            count = notifications.len(),
            "fetched notifications"
        );
        Ok(notifications)
    }

    pub async fn mark_read(&self, id: &NotificationId) -> Result<()> {
        let path = format!("notifications/{}/read", encode(id.as_str()));
        self.client
            .execute(Method::PUT, &path, "mark_notification_read")
            .await?;
        Ok(())
    }

    pub async fn mark_all_read(&self, receiver_code: &str) -> Result<()> {
        let path = format!("notifications/receiver/{}/read-all", encode(receiver_code));
        self.client
            .execute(Method::PUT, &path, "mark_all_notifications_read")
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &NotificationId) -> Result<()> {
        let path = format!("notifications/{}", encode(id.as_str()));
        self.client
            .execute(Method::DELETE, &path, "delete_notification")
            .await?;
        Ok(())
    }

    pub async fn delete_all(&self, receiver_code: &str) -> Result<()> {
        let path = format!("notifications/receiver/{}", encode(receiver_code));
        self.client
            .execute(Method::DELETE, &path, "delete_all_notifications")
            .await?;
        Ok(())
    }
}

/// Parse a list body, either a bare array or `{ "data": [...] }`
///
/// Entries that fail to parse are skipped.
pub fn parse_list(body: &str) -> Result<Vec<Notification>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let items = match serde_json::from_str::<Value>(body)? {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(ClientError::UnexpectedResponse(format!(
                    "list payload: {other}"
                )))
            }
        },
        Value::Null => Vec::new(),
        other => {
            return Err(ClientError::UnexpectedResponse(format!(
                "list payload: {other}"
            )))
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Notification>(item) {
            Ok(notification) => Some(notification),
            Err(e) => {
                warn!(error = %e, "skipping malformed notification in list");
                None
            }
        })
        .collect())
}
