//! Retry scheduling for failed jobs.

use chrono::Utc;
use search_sync_shared::SyncJob;
use std::time::Duration;

use crate::errors::SyncError;
use crate::workers::WorkerOptions;

/// Default cap on the delay before a retry, in seconds.
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 600;

/// What to do with a job whose worker failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Re-enqueue this job.
    Retry(SyncJob),
    /// Give up and log the job as dead.
    Dead { reason: String },
}

/// Polynomial backoff, `attempt^4 + 15` seconds, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS))
    }
}

impl RetryPolicy {
    pub fn new(max_backoff: Duration) -> Self {
        Self { max_backoff }
    }

    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Delay before re-running a job that has failed `attempt + 1` times.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let secs = u64::from(attempt)
            .saturating_pow(4)
            .saturating_add(15);
        Duration::from_secs(secs).min(self.max_backoff)
    }

    pub fn decide(&self, job: &SyncJob, error: &SyncError, options: &WorkerOptions) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::Dead {
                reason: format!("not retryable: {}", error),
            };
        }
        if job.attempt >= options.retry {
            return RetryDecision::Dead {
                reason: format!("retries exhausted after {} attempts: {}", job.attempt + 1, error),
            };
        }

        let delay = chrono::Duration::from_std(self.backoff(job.attempt))
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_MAX_BACKOFF_SECS as i64));
        RetryDecision::Retry(job.retried(Utc::now() + delay))
    }
}
