/// Inbound push payloads from the broker topic
use crate::models::Notification;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload carries no notification id")]
    MissingId,
    #[error("payload does not describe a notification: {0}")]
    InvalidShape(#[source] serde_json::Error),
}

/// Parse a MESSAGE body into a notification
///
/// Some publishers wrap the notification as `{"notification": {...}}` or
/// `{"data": {...}}`; the inner object is used in that case.
pub fn parse_push(body: &str) -> Result<Notification, PushError> {
    let value: Value = serde_json::from_str(body).map_err(PushError::InvalidJson)?;
    let object = unwrap_envelope(value);

    if !object.is_object() {
        return Err(PushError::NotAnObject);
    }
    match object.get("id") {
        None | Some(Value::Null) => return Err(PushError::MissingId),
        Some(_) => {}
    }

    serde_json::from_value(object).map_err(PushError::InvalidShape)
}

fn unwrap_envelope(value: Value) -> Value {
    if value.get("id").is_some() {
        return value;
    }
    match value {
        Value::Object(mut map) => {
            for key in ["notification", "data", "payload"] {
                if let Some(inner @ Value::Object(_)) = map.remove(key) {
                    return inner;
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}
