//! Retry/backoff policy.
//!
//! A pure function from (attempt count, execution result, now) to the job's
//! next state and next eligibility time. The store applies the returned
//! [`Transition`]; nothing here touches the database or the clock.

use std::time::Duration;

use crate::scheduling::JobState;
use crate::types::Timestamp;

/// Upper bound on a single backoff delay (7 days).
///
/// `base_backoff ^ attempts` grows without limit; the cap keeps the
/// resulting `available_at` representable.
pub const MAX_BACKOFF_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// Per-job retry settings, copied from the job row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Execution attempts allowed before the job is dead.
    pub max_retries: i64,
    /// Base of the exponential backoff, in seconds.
    pub base_backoff: f64,
}

/// The state a `processing` job moves to once its execution finishes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// The command exited with code 0.
    Completed,
    /// The command failed and attempts remain.
    Retry {
        attempts: i64,
        delay: Duration,
        available_at: Timestamp,
    },
    /// The command failed and the retry budget is exhausted.
    Dead { attempts: i64 },
}

impl Transition {
    /// The job state this transition lands in.
    pub fn state(&self) -> JobState {
        match self {
            Transition::Completed => JobState::Completed,
            Transition::Retry { .. } => JobState::Pending,
            Transition::Dead { .. } => JobState::Dead,
        }
    }
}

impl RetryPolicy {
    /// Delay before a job that has failed `attempts` times may run again:
    /// `base_backoff ^ attempts` seconds, capped at [`MAX_BACKOFF_SECS`].
    pub fn backoff_delay(&self, attempts: i64) -> Duration {
        let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
        let secs = self.base_backoff.powi(exponent);
        if secs.is_finite() {
            Duration::from_secs_f64(secs.clamp(0.0, MAX_BACKOFF_SECS))
        } else {
            Duration::from_secs_f64(MAX_BACKOFF_SECS)
        }
    }

    /// Compute the transition for a job that had made `attempts` attempts
    /// before this execution.
    ///
    /// Success keeps the attempt count. Failure increments it; the job is
    /// dead once the incremented count reaches `max_retries`, otherwise it
    /// becomes eligible again after [`backoff_delay`](Self::backoff_delay).
    pub fn next_transition(&self, attempts: i64, success: bool, now: Timestamp) -> Transition {
        if success {
            return Transition::Completed;
        }

        let attempts = attempts + 1;
        if attempts >= self.max_retries {
            return Transition::Dead { attempts };
        }

        let delay = self.backoff_delay(attempts);
        let micros = i64::try_from(delay.as_micros()).unwrap_or(i64::MAX);
        Transition::Retry {
            attempts,
            delay,
            available_at: now + chrono::Duration::microseconds(micros),
        }
    }
}
