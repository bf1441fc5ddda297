//! Read-after-write confirmation with exponential backoff.
//!
//! The bootstrap re-reads the System Owner and the first Owner before acting
//! as them. On an eventually consistent store a fresh write may briefly read
//! back as `NotFound`, so only that outcome is retried; every other error is
//! permanent.

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoff;
use tracing::warn;

use quire_core::{DomainError, DomainResult};

/// Bounds for confirmation-read retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Give up (and surface the last `NotFound`) after this much time.
    pub max_elapsed: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(50),
            max_interval: Duration::from_secs(1),
            max_elapsed: Duration::from_secs(10),
        }
    }
}

impl ConfirmationPolicy {
    /// Single attempt; for stores with read-after-write consistency.
    pub fn immediate() -> Self {
        Self {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(1),
            max_elapsed: Duration::ZERO,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: 2.0,
            max_elapsed_time: Some(self.max_elapsed),
            ..ExponentialBackoff::default()
        }
    }

    /// Run `read` until it stops returning `NotFound` or the policy gives up.
    pub async fn confirm<T, F, Fut>(&self, what: &str, mut read: F) -> DomainResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        backoff::future::retry_notify(
            self.backoff(),
            || {
                let attempt = read();
                async move {
                    attempt.await.map_err(|e: DomainError| {
                        if e.is_not_found() {
                            backoff::Error::transient(e)
                        } else {
                            backoff::Error::permanent(e)
                        }
                    })
                }
            },
            |err: DomainError, wait: Duration| {
                let retry_in_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
                warn!(what, error = %err, retry_in_ms, "write not visible yet");
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> ConfirmationPolicy {
        ConfirmationPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            max_elapsed: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn retries_not_found_until_visible() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let out = fast()
            .confirm("owner", move || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DomainError::not_found("owner"))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(out, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let out: DomainResult<()> = fast()
            .confirm("owner", move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(DomainError::storage("connection refused"))
            })
            .await;

        assert_eq!(out, Err(DomainError::storage("connection refused")));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn immediate_policy_gives_up_after_first_miss() {
        let out: DomainResult<()> = ConfirmationPolicy::immediate()
            .confirm("owner", || async { Err(DomainError::not_found("owner")) })
            .await;

        assert!(out.unwrap_err().is_not_found());
    }
}
