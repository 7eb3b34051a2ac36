/// Resilience patterns for the notification client
///
/// This library provides the small set of recovery helpers the client relies on:
/// - **Timeout**: Deadline for the broker handshake, plus the REST request timeout setting
/// - **Retry**: Exponential backoff with jitter for idempotent requests, gated by a predicate
/// - **Linear Backoff**: Capped `attempt × base` delays for live-channel reconnects
/// - **Preset Configurations**: Pre-tuned settings for the live channel and the REST API
///
/// # Example: Reconnect Schedule
///
/// ```rust
/// use resilience::LinearBackoff;
/// use std::time::Duration;
///
/// let backoff = LinearBackoff::new(Duration::from_secs(3), 5);
/// assert_eq!(backoff.delay_for(2), Some(Duration::from_secs(6)));
/// assert_eq!(backoff.delay_for(6), None);
/// ```
///
/// # Example: Idempotent Fetch with Retry
///
/// ```rust,no_run
/// use resilience::{presets, retry::with_retry_if};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::rest_api_config();
///     let retry = config.retry.unwrap_or_default();
///
///     let result = with_retry_if(
///         retry,
///         || async {
///             // Your GET request here
///             Ok::<_, String>(())
///         },
///         |err: &String| err.starts_with("5"),
///     )
///     .await;
/// }
/// ```

pub mod backoff;
pub mod presets;
pub mod retry;
pub mod timeout;

// Re-export main types for convenience
pub use backoff::LinearBackoff;
pub use presets::{live_channel_config, rest_api_config, ServiceConfig};
pub use retry::{with_retry_if, RetryConfig, RetryError};
pub use timeout::{with_timeout, TimeoutConfig, TimeoutError};
