// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Bounded polling with capped exponential backoff.

use crate::error::{Result, SeedError};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Backoff settings for [`wait_until`]
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub timeout: Duration,
}

impl Backoff {
    pub fn with_timeout(timeout: Duration) -> Self {
        use crate::constants::poll::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
        Backoff {
            initial: Duration::from_secs(POLL_INTERVAL_SECS),
            max: Duration::from_secs(POLL_MAX_INTERVAL_SECS),
            timeout,
        }
    }
}

/// Poll `check` until it yields `Some`, sleeping with exponential backoff in between.
///
/// Errors from `check` are logged and retried; only the deadline ends the wait.
pub async fn wait_until<F, Fut, T>(what: &str, backoff: Backoff, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now().checked_add(backoff.timeout).ok_or_else(|| {
        SeedError::Config(format!(
            "timeout of {}s for {} is out of range",
            backoff.timeout.as_secs(),
            what
        ))
    })?;
    let mut interval = backoff.initial;

    loop {
        match check().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => debug!("{} not ready yet, waiting {:?}", what, interval),
            Err(e) => warn!("Error while waiting for {}: {}, retrying in {:?}", what, e, interval),
        }

        if deadline.saturating_duration_since(Instant::now()) < interval {
            return Err(SeedError::Timeout {
                what: what.to_string(),
                secs: backoff.timeout.as_secs(),
            });
        }
        sleep(interval).await;

        // Exponential backoff with max cap
        interval = interval.saturating_mul(2).min(backoff.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> Backoff {
        Backoff {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(40),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_returns_first_ready_value() {
        let calls = AtomicU32::new(0);
        let value = wait_until("thing", fast(), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok(if n >= 2 { Some(n) } else { None })
        })
        .await
        .unwrap();

        assert_eq!(value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_retries_through_errors() {
        let calls = AtomicU32::new(0);
        let value = wait_until("thing", fast(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SeedError::Config("flaky".to_string()))
            } else {
                Ok(Some("ready"))
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "ready");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_times_out() {
        let result: Result<()> = wait_until("never", fast(), || async { Ok(None) }).await;

        assert!(matches!(result, Err(SeedError::Timeout { ref what, .. }) if what == "never"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_is_an_error() {
        let backoff = Backoff {
            timeout: Duration::MAX,
            ..fast()
        };
        let calls = AtomicU32::new(0);
        let result: Result<()> = wait_until("forever", backoff, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })
        .await;

        assert!(matches!(result, Err(SeedError::Config(ref msg)) if msg.contains("forever")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_backoff_cap_does_not_overflow() {
        let backoff = Backoff {
            initial: Duration::from_secs(u64::MAX / 2 + 1),
            max: Duration::MAX,
            timeout: Duration::from_secs(1),
        };
        let result: Result<()> = wait_until("capped", backoff, || async { Ok(None) }).await;

        assert!(matches!(result, Err(SeedError::Timeout { .. })));
    }
}
