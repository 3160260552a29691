//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use fieldsync_remote::DEFAULT_IN_LIMIT;
use std::time::Duration;

/// Configuration for sync cycles.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Documents fetched per page.
    pub page_size: usize,
    /// Route ids per `in` query.
    pub where_in_limit: usize,
    /// Age of the last global sync after which a background cycle runs.
    pub background_freshness: Duration,
    /// Queued mutations sent between cancellation checks.
    pub queue_batch_size: usize,
    /// Retries granted to newly queued mutations.
    pub default_max_retries: u32,
    /// Fall back to a complete pull when an incremental pull fails or finds
    /// nothing for an empty local table.
    pub incremental_fallback: bool,
    /// Retry configuration for whole cycles.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            page_size: 500,
            where_in_limit: DEFAULT_IN_LIMIT,
            background_freshness: Duration::from_secs(6 * 60 * 60),
            queue_batch_size: 50,
            default_max_retries: 3,
            incremental_fallback: true,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the `in` chunk size.
    pub fn with_where_in_limit(mut self, limit: usize) -> Self {
        self.where_in_limit = limit;
        self
    }

    /// Sets the background freshness threshold.
    pub fn with_background_freshness(mut self, freshness: Duration) -> Self {
        self.background_freshness = freshness;
        self
    }

    /// Sets the queue batch size.
    pub fn with_queue_batch_size(mut self, size: usize) -> Self {
        self.queue_batch_size = size;
        self
    }

    /// Sets the retries granted to queued mutations.
    pub fn with_default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = retries;
        self
    }

    /// Enables or disables the complete-pull fallbacks.
    pub fn with_incremental_fallback(mut self, enabled: bool) -> Self {
        self.incremental_fallback = enabled;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Checks the configuration for values the engine cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.page_size == 0 {
            return Err(SyncError::Config("page_size must be positive".into()));
        }
        if self.where_in_limit == 0 {
            return Err(SyncError::Config("where_in_limit must be positive".into()));
        }
        if self.queue_batch_size == 0 {
            return Err(SyncError::Config("queue_batch_size must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::Config("retry.max_attempts must be positive".into()));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff between whole-cycle retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration with `max_attempts` attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// A single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.add_jitter = enabled;
        self
    }

    /// Delay to wait before attempt `attempt` (0-indexed; the first attempt never waits).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = (self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay.as_secs_f64());
        let factor = if self.add_jitter {
            1.0 + 0.25 * jitter_fraction()
        } else {
            1.0
        };
        Duration::from_secs_f64(secs * factor)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Pseudo-random value in `[0, 1)` taken from the sub-second clock.
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1024) / 1024.0
}
