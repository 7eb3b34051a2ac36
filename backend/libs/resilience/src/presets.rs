/// Preset configurations for the client's two kinds of remote calls
use crate::backoff::LinearBackoff;
use crate::retry::RetryConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for a remote dependency
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    pub retry: Option<RetryConfig>,
    pub reconnect: Option<LinearBackoff>,
}

/// Live broker channel (WebSocket + STOMP)
///
/// - Timeout: 10s for handshake and subscription receipt
/// - No request retry (reconnects are scheduled instead)
/// - Reconnect: 5 attempts, 3s × attempt
pub fn live_channel_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(10),
        },
        retry: None,
        reconnect: Some(LinearBackoff {
            base: Duration::from_secs(3),
            max_attempts: 5,
        }),
    }
}

/// Backend REST API
///
/// - Timeout: 15s per request
/// - Retry: 2 attempts for idempotent reads
/// - No reconnect schedule
pub fn rest_api_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(15),
        },
        retry: Some(RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }),
        reconnect: None,
    }
}
