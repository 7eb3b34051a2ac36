use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Server-assigned notification identifier
///
/// The backend emits numeric ids on some endpoints and string ids on others,
/// so both are accepted and normalised to their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NotificationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for NotificationId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for NotificationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(serde_json::Number),
            Text(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Number(n) => Ok(NotificationId(n.to_string())),
            RawId::Text(s) if !s.trim().is_empty() => Ok(NotificationId(s)),
            RawId::Text(_) => Err(serde::de::Error::custom("notification id is empty")),
        }
    }
}

/// Notification category shown by the console
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum NotificationType {
    Success,
    Warning,
    #[default]
    Info,
    Alert,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Success => "success",
            NotificationType::Warning => "warning",
            NotificationType::Info => "info",
            NotificationType::Alert => "alert",
        }
    }
}

impl From<String> for NotificationType {
    fn from(s: String) -> Self {
        NotificationType::from(s.as_str())
    }
}

impl From<&str> for NotificationType {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "success" => NotificationType::Success,
            "warning" => NotificationType::Warning,
            "alert" | "error" => NotificationType::Alert,
            _ => NotificationType::Info,
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Employee who triggered the notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SenderRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
}

/// Core notification model
///
/// Publishers disagree on field names (`message`/`body`/`content`,
/// `read`/`isRead`, `createdAt`/`timestamp`, `actionRef`/`actionUrl`) and
/// some send several spellings at once, so input goes through
/// `RawNotification` where each spelling is its own optional field. The
/// first name in each list that carries a value wins. Output always uses the
/// first spelling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", from = "RawNotification")]
pub struct Notification {
    pub id: NotificationId,

    pub title: String,

    /// Notification body/message
    pub message: String,

    #[serde(rename = "type")]
    pub notification_type: NotificationType,

    pub read: bool,

    /// Creation timestamp, RFC 3339 or epoch milliseconds on the wire
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderRef>,

    /// Link or entity reference the UI navigates to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_ref: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNotification {
    id: NotificationId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, rename = "type")]
    notification_type: Option<NotificationType>,
    #[serde(default)]
    read: Option<bool>,
    #[serde(default)]
    is_read: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    sender: Option<SenderRef>,
    #[serde(default)]
    action_ref: Option<String>,
    #[serde(default)]
    action_url: Option<String>,
}

impl From<RawNotification> for Notification {
    fn from(raw: RawNotification) -> Self {
        Self {
            id: raw.id,
            title: raw.title.unwrap_or_default(),
            message: raw.message.or(raw.body).or(raw.content).unwrap_or_default(),
            notification_type: raw.notification_type.unwrap_or_default(),
            read: raw.read.or(raw.is_read).unwrap_or(false),
            created_at: raw.created_at.or(raw.timestamp),
            sender: raw.sender,
            action_ref: raw.action_ref.or(raw.action_url),
        }
    }
}

impl Notification {
    pub fn new(
        id: impl Into<NotificationId>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            message: message.into(),
            notification_type: NotificationType::Info,
            read: false,
            created_at: Some(Utc::now()),
            sender: None,
            action_ref: None,
        }
    }

    pub fn with_type(mut self, notification_type: NotificationType) -> Self {
        self.notification_type = notification_type;
        self
    }

    pub fn with_sender(mut self, name: impl Into<String>, code: impl Into<String>) -> Self {
        self.sender = Some(SenderRef {
            name: name.into(),
            code: code.into(),
        });
        self
    }

    pub fn mark_read(&mut self) {
        self.read = true;
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        Text(String),
    }

    let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawTimestamp::Millis(ms)) => Utc.timestamp_millis_opt(ms).single(),
        Some(RawTimestamp::Text(text)) => parse_timestamp_text(&text),
        None => None,
    })
}

fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    // Backend LocalDateTime values carry no offset; they are treated as UTC
    chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Live-channel connection status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
