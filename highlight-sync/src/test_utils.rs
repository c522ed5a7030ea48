//! Polling assertions for async tests.
//!
//! Background work here (queue drains, daemon startup, socket binding) finishes
//! "soon" rather than at a known instant. These helpers retry a probe until it
//! passes instead of sleeping for a guessed duration.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

/// Retry `probe` every `interval` until it returns `Ok`, panicking after `timeout`.
///
/// Returns the value of the first successful probe. The panic message names
/// `desc` and carries the last error.
///
/// ```rust,ignore
/// let remaining = assert_eventually(
///     "queue to drain",
///     Duration::from_secs(2),
///     Duration::from_millis(20),
///     || async {
///         match port.send(ExtensionRequest::GetQueueStatus).await {
///             Ok(ExtensionResponse::GetQueueStatus(s)) if s.queue_length == 0 => Ok(0),
///             other => Err(format!("{:?}", other)),
///         }
///     },
/// )
/// .await;
/// ```
pub async fn assert_eventually<F, Fut, T, E>(
    desc: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let last_error = match probe().await {
            Ok(value) => return value,
            Err(e) => e.to_string(),
        };

        if start.elapsed() >= timeout {
            panic!(
                "Timeout waiting for {} after {:?} ({} attempts). Last error: {}",
                desc,
                start.elapsed(),
                attempts,
                last_error
            );
        }
        tokio::time::sleep(interval).await;
    }
}

/// [`assert_eventually`] for a plain boolean condition.
pub async fn assert_eventually_bool<F, Fut>(
    desc: &str,
    timeout: Duration,
    interval: Duration,
    mut condition: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    assert_eventually(desc, timeout, interval, || {
        let check = condition();
        async move {
            if check.await {
                Ok(())
            } else {
                Err("condition still false")
            }
        }
    })
    .await
}
