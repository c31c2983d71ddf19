//! # Conflict Retry
//!
//! Reruns a whole operation when the store reports a conflict.
//!
//! ## When It Applies
//! ```text
//! attempt 1 ── Conflict (busy / stale version) ── sleep ~initial ──┐
//! attempt 2 ── Conflict ─────────────────────── sleep ~2x ─────────┤
//! attempt 3 ── Ok ─────────────────────────────────────────────────┴─► result
//!
//! Any non-conflict error returns immediately.
//! ```
//!
//! Each attempt opens its own transaction, so a retried operation re-reads
//! current state and the lifecycle rules see whatever the winner wrote.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use tracing::{debug, warn};

use crate::config::RetrySettings;
use crate::error::EngineResult;

fn create_backoff(settings: &RetrySettings) -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: settings.initial_backoff(),
        max_interval: settings.max_backoff(),
        multiplier: 2.0,
        max_elapsed_time: None, // bounded by max_attempts instead
        ..Default::default()
    }
}

/// Runs `op` until it succeeds, fails with a non-conflict error, or
/// `settings.max_attempts` is used up.
pub async fn with_retry<T, F, Fut>(settings: &RetrySettings, operation: &str, mut op: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let mut backoff = create_backoff(settings);
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation, attempt = attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < settings.max_attempts => {
                let delay = backoff.next_backoff().unwrap_or_else(|| settings.max_backoff());
                warn!(
                    operation = operation,
                    attempt = attempt,
                    ?delay,
                    error = %e,
                    "Store conflict, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
