use std::future::Future;
use std::time::Duration;

use super::errors::ApiError;

/// Runs `future` under a deadline. An elapsed deadline becomes `ApiError::Timeout`.
pub async fn with_deadline<T, F>(label: &str, duration: Duration, future: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(call = label, timeout_ms = duration.as_millis() as u64, "Outbound call timed out");
            Err(ApiError::Timeout(format!(
                "{} exceeded {}ms",
                label,
                duration.as_millis()
            )))
        }
    }
}
