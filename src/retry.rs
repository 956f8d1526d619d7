//! Bounded retries for remote calls made by the periodic tasks and the one-shot sync commands.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retry `op` using the provided sleep schedule.
///
/// - The operation is attempted once immediately.
/// - After each failure, we sleep for the next delay and retry.
/// - When delays are exhausted, the final error is returned.
pub(crate) async fn retry_with_delays<T, E, F, Fut>(
    what: &str,
    delays: &[Duration],
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    for (attempt, delay) in delays.iter().enumerate() {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(
                    "{what} failed on attempt {}, retrying in {delay:?}: {e}",
                    attempt + 1
                );
                tokio::time::sleep(*delay).await;
            }
        }
    }
    op().await
}
