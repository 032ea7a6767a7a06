//! Reusable fixed-interval polling with an optional deadline.
//!
//! Every "wait for condition" step in the workflow (lease readiness,
//! transfer completion, reconfigure-task completion, power-state drain,
//! IP discovery) goes through [`poll_until`] so no wait loop is open-coded.

use crate::errors::{ProvisionError, ProvisionResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Poll `probe` every `interval` until it yields a value.
///
/// `probe` returns `Ok(Some(v))` when the condition holds, `Ok(None)` to keep
/// waiting, or `Err` to abort. With `deadline = None` the loop never gives
/// up; otherwise expiry yields [`ProvisionError::Timeout`] carrying `what`.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    interval: Duration,
    deadline: Option<Duration>,
    mut probe: F,
) -> ProvisionResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProvisionResult<Option<T>>>,
{
    let started = Instant::now();
    loop {
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        if let Some(limit) = deadline {
            if started.elapsed() >= limit {
                return Err(ProvisionError::Timeout(what.to_string()));
            }
        }
        tracing::trace!(what, "condition not met, sleeping");
        tokio::time::sleep(interval).await;
    }
}
