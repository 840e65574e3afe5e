//! Retry policy for rate-limited and failed requests.
//!
//! Responses are sorted into status classes. Rate-limited (429) responses
//! back off exponentially with jitter unless the server sends a
//! `Retry-After` hint. Server errors are retried after a fixed delay, and
//! only for read-only methods. Every class has a hard attempt ceiling.

use std::time::Duration;

use http::{Method, StatusCode};
use rand::Rng;

/// Maximum retries for rate-limited responses.
pub const DEFAULT_MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Base delay for rate-limit backoff.
pub const DEFAULT_RATE_LIMIT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Maximum retries for server errors on read-only methods.
pub const DEFAULT_MAX_SERVER_ERROR_RETRIES: u32 = 1;

/// Fixed delay before retrying a server error.
pub const DEFAULT_SERVER_ERROR_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of rate-limit retries per call.
    pub max_rate_limit_retries: u32,
    /// Base delay for rate-limit backoff.
    pub rate_limit_base_delay: Duration,
    /// Maximum number of server-error retries per call.
    pub max_server_error_retries: u32,
    /// Delay before retrying a server error.
    pub server_error_retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
            rate_limit_base_delay: DEFAULT_RATE_LIMIT_BASE_DELAY,
            max_server_error_retries: DEFAULT_MAX_SERVER_ERROR_RETRIES,
            server_error_retry_delay: DEFAULT_SERVER_ERROR_RETRY_DELAY,
        }
    }
}

impl RetryConfig {
    /// Create a config that never retries.
    pub fn disabled() -> Self {
        Self {
            max_rate_limit_retries: 0,
            max_server_error_retries: 0,
            ..Default::default()
        }
    }

    /// Set the rate-limit retry ceiling and base delay.
    pub fn with_rate_limit(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_rate_limit_retries = max_retries;
        self.rate_limit_base_delay = base_delay;
        self
    }

    /// Set the server-error retry ceiling and delay.
    pub fn with_server_errors(mut self, max_retries: u32, delay: Duration) -> Self {
        self.max_server_error_retries = max_retries;
        self.server_error_retry_delay = delay;
        self
    }

    /// Exponential component of the rate-limit delay: `base × 2^attempt`.
    pub fn rate_limit_base(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.rate_limit_base_delay.saturating_mul(factor)
    }

    /// Delay before the next rate-limit retry.
    ///
    /// A `Retry-After` hint replaces the computed delay exactly.
    pub fn rate_limit_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint;
        }
        let base = self.rate_limit_base(attempt);
        base.saturating_add(jitter(base))
    }
}

/// Random jitter uniformly distributed over `[0, base / 2)`.
pub fn jitter(base: Duration) -> Duration {
    let half = u64::try_from((base / 2).as_nanos()).unwrap_or(u64::MAX);
    if half == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::rng().random_range(0..half))
}

/// Parse a `Retry-After` value given in whole seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Check if a method is read-only and therefore safe to resend.
pub fn is_idempotent(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS
}

/// Response status bands that drive breaker and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx.
    Success,
    /// 4xx except 429.
    ClientError,
    /// 429.
    RateLimited,
    /// 5xx.
    ServerError,
    /// 1xx and 3xx.
    Other,
}

impl StatusClass {
    /// Classify a status code.
    pub fn of(status: StatusCode) -> Self {
        if status.is_success() {
            Self::Success
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited
        } else if status.is_client_error() {
            Self::ClientError
        } else if status.is_server_error() {
            Self::ServerError
        } else {
            Self::Other
        }
    }
}

/// What to do with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hand the response to the caller.
    Return,
    /// Wait for the delay, then resend.
    Retry {
        /// Delay before the next attempt.
        delay: Duration,
        /// 1-based retry number within its status class.
        attempt: u32,
    },
}

/// Retry bookkeeping for one logical call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// Rate-limit retries taken so far.
    pub rate_limit_retries: u32,
    /// Server-error retries taken so far.
    pub server_error_retries: u32,
}

impl RetryState {
    /// Decide whether to retry a response, advancing the matching counter.
    pub fn decide(
        &mut self,
        config: &RetryConfig,
        method: &Method,
        status: StatusCode,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        match StatusClass::of(status) {
            StatusClass::RateLimited => {
                if self.rate_limit_retries >= config.max_rate_limit_retries {
                    return RetryDecision::Return;
                }
                let delay = config.rate_limit_delay(self.rate_limit_retries, retry_after);
                self.rate_limit_retries += 1;
                RetryDecision::Retry {
                    delay,
                    attempt: self.rate_limit_retries,
                }
            }
            StatusClass::ServerError => {
                if !is_idempotent(method)
                    || self.server_error_retries >= config.max_server_error_retries
                {
                    return RetryDecision::Return;
                }
                self.server_error_retries += 1;
                RetryDecision::Retry {
                    delay: config.server_error_retry_delay,
                    attempt: self.server_error_retries,
                }
            }
            StatusClass::Success | StatusClass::ClientError | StatusClass::Other => {
                RetryDecision::Return
            }
        }
    }
}
