/// Deadline for a single remote step (broker handshake, REST request)
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub duration: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("no answer within {0:?}")]
    Elapsed(Duration),
}

/// Run `future` to completion unless `duration` passes first
///
/// The inner output is returned untouched, so a fallible step keeps its own
/// error type inside the `Ok`.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    timeout(duration, future)
        .await
        .map_err(|_| TimeoutError::Elapsed(duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_step_finishing_in_time_keeps_its_output() {
        let result = with_timeout(Duration::from_secs(1), async { Err::<(), _>("refused") }).await;
        assert_eq!(result, Ok(Err("refused")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_step_elapses() {
        let limit = Duration::from_millis(10);
        let result = with_timeout(limit, std::future::pending::<()>()).await;

        assert_eq!(result, Err(TimeoutError::Elapsed(limit)));
        assert_eq!(result.unwrap_err().to_string(), "no answer within 10ms");
    }
}
