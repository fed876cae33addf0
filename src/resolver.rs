use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Roughly one minute of polling at a 60 Hz refresh rate.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3600;
pub const DEFAULT_POLL_INTERVAL_MICROS: u64 = 16_667;

#[derive(Debug, Error)]
pub enum ResolveError<E> {
    #[error("gave up after {attempts} attempts")]
    Timeout { attempts: u32 },
    #[error("resolution was cancelled")]
    Cancelled,
    #[error("lookup failed: {0}")]
    Lookup(E),
}

impl<E> ResolveError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResolveError::Timeout { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    pub max_attempts: u32,
    pub poll_interval_micros: u64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval_micros: DEFAULT_POLL_INTERVAL_MICROS,
        }
    }
}

/// Polls a lookup on a fixed cadence until it finds something or the attempt
/// budget runs out.
///
/// The lookup reports "not there yet" as `Ok(None)`; that is an ordinary miss
/// and schedules another attempt. `Err` means retrying cannot help and ends
/// the wait right away.
#[derive(Debug, Clone, Copy)]
pub struct BoundedResolver {
    max_attempts: u32,
    poll_interval: Duration,
}

impl Default for BoundedResolver {
    fn default() -> Self {
        Self::from_settings(&ResolverSettings::default())
    }
}

impl BoundedResolver {
    pub fn new(max_attempts: u32, poll_interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            poll_interval: poll_interval.max(Duration::from_micros(1)),
        }
    }

    pub fn from_settings(settings: &ResolverSettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_micros(settings.poll_interval_micros),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub async fn resolve<T, E, F>(&self, lookup: F) -> Result<T, ResolveError<E>>
    where
        F: FnMut() -> Result<Option<T>, E>,
    {
        self.resolve_with_cancel(lookup, &CancellationToken::new())
            .await
    }

    pub async fn resolve_with_cancel<T, E, F>(
        &self,
        mut lookup: F,
        cancel: &CancellationToken,
    ) -> Result<T, ResolveError<E>>
    where
        F: FnMut() -> Result<Option<T>, E>,
    {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut attempts = 0u32;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(target = "resolver", attempts, "resolution cancelled");
                    return Err(ResolveError::Cancelled);
                }
                _ = ticker.tick() => {}
            }

            attempts += 1;
            match lookup() {
                Ok(Some(found)) => {
                    tracing::trace!(target = "resolver", attempts, "lookup resolved");
                    return Ok(found);
                }
                Ok(None) => {
                    tracing::trace!(target = "resolver", attempts, "lookup missed");
                }
                Err(err) => return Err(ResolveError::Lookup(err)),
            }

            if attempts >= self.max_attempts {
                tracing::debug!(target = "resolver", attempts, "attempt budget exhausted");
                return Err(ResolveError::Timeout { attempts });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn resolver(max_attempts: u32) -> BoundedResolver {
        BoundedResolver::new(max_attempts, Duration::from_millis(16))
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_exact_budget() {
        let calls = Cell::new(0u32);
        let started = tokio::time::Instant::now();
        let result: Result<(), _> = resolver(3600)
            .resolve(|| {
                calls.set(calls.get() + 1);
                Ok::<_, ()>(None)
            })
            .await;

        assert!(matches!(result, Err(ResolveError::Timeout { attempts: 3600 })));
        assert!(result.unwrap_err().is_timeout());
        assert_eq!(calls.get(), 3600);
        // First attempt is immediate, the rest are one interval apart.
        assert_eq!(started.elapsed(), Duration::from_millis(16) * 3599);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_first_success() {
        let calls = Cell::new(0u32);
        let found = resolver(100)
            .resolve(|| {
                calls.set(calls.get() + 1);
                Ok::<_, ()>((calls.get() == 7).then_some("found"))
            })
            .await
            .unwrap();

        assert_eq!(found, "found");
        assert_eq!(calls.get(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_last_attempt() {
        let calls = Cell::new(0u32);
        let found = resolver(5)
            .resolve(|| {
                calls.set(calls.get() + 1);
                Ok::<_, ()>((calls.get() == 5).then_some(5))
            })
            .await
            .unwrap();
        assert_eq!(found, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_errors_abort_immediately() {
        let calls = Cell::new(0u32);
        let result: Result<(), _> = resolver(100)
            .resolve(|| {
                calls.set(calls.get() + 1);
                Err("broken")
            })
            .await;

        assert!(matches!(result, Err(ResolveError::Lookup("broken"))));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let cancel = CancellationToken::new();
        let calls = Cell::new(0u32);
        let cancel_after = cancel.clone();
        let result: Result<(), ResolveError<()>> = resolver(1000)
            .resolve_with_cancel(
                || {
                    calls.set(calls.get() + 1);
                    if calls.get() == 3 {
                        cancel_after.cancel();
                    }
                    Ok(None)
                },
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(ResolveError::Cancelled)));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn zero_budget_still_tries_once() {
        assert_eq!(BoundedResolver::new(0, Duration::ZERO).max_attempts(), 1);
        let defaults = BoundedResolver::default();
        assert_eq!(defaults.max_attempts(), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(defaults.poll_interval(), Duration::from_micros(16_667));
    }
}
