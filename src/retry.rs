use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retries an async action up to `attempts` times, waiting `wait` between
/// attempts. The wait happens after a failure, except after the last
/// attempt. On final failure the optional `on_exhausted` hook runs exactly
/// once (e.g. capture a diagnostic screenshot via the driver) before the
/// last error is surfaced.
///
/// Backoff growth is deliberately not handled here; the stream client owns
/// its own exponential reconnect schedule.
pub async fn retry_with_wait<T, A, Fut, H, HFut>(
    action_name: &str,
    attempts: u32,
    wait: Duration,
    mut action: A,
    on_exhausted: Option<H>,
) -> Result<T>
where
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    H: FnOnce() -> HFut,
    HFut: Future<Output = ()>,
{
    let mut last_error = None;

    for attempt in 1..=attempts {
        match action().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(
                    "\"{}\" failed (attempt {}/{}): {}",
                    action_name, attempt, attempts, e
                );
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    if let Some(hook) = on_exhausted {
        hook().await;
    }

    Err(match last_error {
        Some(e) => e.context(format!(
            "\"{}\" did not succeed after {} attempts",
            action_name, attempts
        )),
        None => anyhow::anyhow!("\"{}\" was given no attempts", action_name),
    })
}

/// Convenience for callers that do not pass an exhaustion hook, so they
/// can write `no_hook()` instead of spelling out the closure type.
pub fn no_hook() -> Option<fn() -> std::future::Ready<()>> {
    None
}
