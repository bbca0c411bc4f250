//! Retrying operations that hit the provider's rate limit.
//!
//! # Design
//! `retry_on_rate_limit` re-runs an action for as long as it fails with
//! `ApiError::RateLimited`. Every other outcome is returned as is. Waits grow
//! exponentially up to `max_delay` and are always cut short by the caller's
//! `Deadline`, so a retry loop never outlives it. A `CancellationToken`
//! attached to the deadline wakes a sleeping retry immediately.
//!
//! Waiting blocks the calling thread. Resource operations themselves never
//! sleep; this is the only place the crate suspends.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::error::ApiError;

/// Shortest wait between attempts, whatever the policy says.
pub const MIN_DELAY: Duration = Duration::from_millis(1);

/// Exponential backoff between rate-limited attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Constant delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Wait after the given failed attempt (0-based), never below `MIN_DELAY`.
    ///
    /// A growth that overflows or is not a finite number falls back to
    /// `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay);
        delay.min(self.max_delay).max(MIN_DELAY)
    }
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Shared flag that aborts retry loops waiting on it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<CancelState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self.lock();
        *cancelled = true;
        self.state.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        match self.state.cancelled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Blocks for up to `timeout`. Returns true if cancelled meanwhile.
    fn sleep(&self, timeout: Duration) -> bool {
        // `None` means the wait is too long to represent: block until cancelled.
        let until = Instant::now().checked_add(timeout);
        let mut cancelled = self.lock();
        loop {
            if *cancelled {
                return true;
            }
            cancelled = match until {
                Some(until) => {
                    let now = Instant::now();
                    if now >= until {
                        return false;
                    }
                    match self.state.wake.wait_timeout(cancelled, until - now) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => match self.state.wake.wait(cancelled) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                },
            };
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Slept,
    Expired,
    Cancelled,
}

/// Point in time after which retrying stops, plus optional cancellation.
///
/// A deadline too far out to represent as an `Instant` never expires.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl Deadline {
    pub fn at(at: Instant) -> Self {
        Self {
            at: Some(at),
            cancel: None,
        }
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
            cancel: None,
        }
    }

    /// No time limit; only cancellation stops the retries.
    pub fn never() -> Self {
        Self { at: None, cancel: None }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn remaining(&self) -> Duration {
        self.at
            .map_or(Duration::MAX, |at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn sleep(&self, wanted: Duration) -> Wake {
        let nap = wanted.min(self.remaining());
        match &self.cancel {
            Some(token) => {
                if token.sleep(nap) {
                    return Wake::Cancelled;
                }
            }
            None => std::thread::sleep(nap),
        }
        if nap < wanted || self.is_expired() {
            Wake::Expired
        } else {
            Wake::Slept
        }
    }
}

/// Run `action` until it stops reporting a rate limit or `deadline` passes.
#[instrument(level = "debug", skip_all)]
pub fn retry_on_rate_limit<T, F>(
    policy: &RetryPolicy,
    deadline: &Deadline,
    mut action: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Result<T, ApiError>,
{
    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        if deadline.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        if deadline.is_expired() {
            return Err(ApiError::DeadlineExceeded {
                attempts,
                elapsed: started.elapsed(),
            });
        }

        attempts += 1;
        let err = match action() {
            Err(err) if err.is_rate_limited() => err,
            outcome => {
                debug!(attempts, "retry loop finished");
                return outcome;
            }
        };

        let delay = policy.delay_for(attempts - 1);
        warn!(
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "rate limited, backing off"
        );
        match deadline.sleep(delay) {
            Wake::Slept => {}
            Wake::Expired => {
                return Err(ApiError::DeadlineExceeded {
                    attempts,
                    elapsed: started.elapsed(),
                })
            }
            Wake::Cancelled => return Err(ApiError::Cancelled),
        }
    }
}
