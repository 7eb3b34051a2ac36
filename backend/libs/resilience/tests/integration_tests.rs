/// Integration tests for resilience library
use resilience::{
    presets,
    retry::{with_retry_if, RetryConfig, RetryError},
    timeout::{with_timeout, TimeoutError},
    LinearBackoff,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ==================== Timeout Tests ====================

#[tokio::test]
async fn test_timeout_success() {
    let result = with_timeout(Duration::from_secs(1), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        42
    })
    .await;

    assert_eq!(result.unwrap(), 42);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_elapsed() {
    let result = with_timeout(Duration::from_millis(50), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        42
    })
    .await;

    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_handshake_preset_bounds_silent_peer() {
    let limit = presets::live_channel_config().timeout.duration;
    let start = tokio::time::Instant::now();

    let result = with_timeout(limit, async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok::<_, String>("CONNECTED")
    })
    .await;

    assert_eq!(result.unwrap_err(), TimeoutError::Elapsed(Duration::from_secs(10)));
    assert!(start.elapsed() < Duration::from_secs(11));
}

// ==================== Retry Tests ====================

#[tokio::test(start_paused = true)]
async fn test_retry_with_rest_preset_recovers() {
    let config = presets::rest_api_config().retry.unwrap_or_default();
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result = with_retry_if(
        config,
        move || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count == 0 {
                    Err("503 service unavailable")
                } else {
                    Ok("payload")
                }
            }
        },
        |e: &&str| e.starts_with("503"),
    )
    .await;

    assert_eq!(result.unwrap(), "payload");
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_predicate_distinguishes_errors() {
    let config = RetryConfig {
        max_retries: 4,
        initial_backoff: Duration::from_millis(10),
        jitter: false,
        ..Default::default()
    };
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    // 500, 502, then 400: the 400 ends the loop
    let result = with_retry_if(
        config,
        move || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                let status: u16 = match count {
                    0 => 500,
                    1 => 502,
                    _ => 400,
                };
                Err::<(), _>(status)
            }
        },
        |status| *status >= 500,
    )
    .await;

    assert!(matches!(result, Err(RetryError::OperationFailed(400))));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

// ==================== Backoff Tests ====================

#[test]
fn test_live_channel_backoff_schedule() {
    let backoff = presets::live_channel_config()
        .reconnect
        .unwrap_or_default();

    let delays: Vec<Duration> = (1..=backoff.max_attempts)
        .filter_map(|attempt| backoff.delay_for(attempt))
        .collect();

    assert_eq!(
        delays,
        vec![
            Duration::from_secs(3),
            Duration::from_secs(6),
            Duration::from_secs(9),
            Duration::from_secs(12),
            Duration::from_secs(15),
        ]
    );
    assert!(backoff.delay_for(backoff.max_attempts + 1).is_none());
}

#[test]
fn test_custom_backoff() {
    let backoff = LinearBackoff::new(Duration::from_millis(250), 2);
    assert_eq!(backoff.delay_for(2), Some(Duration::from_millis(500)));
    assert!(backoff.is_exhausted(2));
}
