//! API client configuration.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::ConfigError;
use crate::retry::RetryConfig;

/// Default API origin.
pub const DEFAULT_BASE_URL: &str = "https://api.dub.co";

/// Default overall per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default idle connection lifetime.
pub const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Default idle connections kept per host.
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 10;

/// Environment variable holding the bearer credential.
pub const ENV_API_KEY: &str = "DUB_API_KEY";
/// Environment variable overriding the base URL.
pub const ENV_BASE_URL: &str = "DUB_BASE_URL";
/// Environment variable overriding the timeout, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "DUB_TIMEOUT_SECS";
/// Environment variable overriding the breaker threshold.
pub const ENV_CIRCUIT_BREAKER_THRESHOLD: &str = "DUB_CIRCUIT_BREAKER_THRESHOLD";
/// Environment variable overriding the breaker cooldown, in seconds.
pub const ENV_CIRCUIT_BREAKER_COOLDOWN_SECS: &str = "DUB_CIRCUIT_BREAKER_COOLDOWN_SECS";
/// Environment variable overriding the rate-limit retry ceiling.
pub const ENV_MAX_RATE_LIMIT_RETRIES: &str = "DUB_MAX_RATE_LIMIT_RETRIES";
/// Environment variable overriding the server-error retry ceiling.
pub const ENV_MAX_SERVER_ERROR_RETRIES: &str = "DUB_MAX_SERVER_ERROR_RETRIES";

/// API client configuration.
///
/// Immutable once the client is built.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL every request path is appended to.
    pub base_url: String,
    /// Bearer credential.
    pub api_key: String,
    /// Overall per-request timeout.
    pub timeout: Duration,
    /// Idle connection lifetime.
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// User agent string.
    pub user_agent: String,
    /// Circuit breaker configuration.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry configuration.
    pub retry: RetryConfig,
}

impl ClientConfig {
    /// Create a configuration with defaults and the given credential.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            user_agent: format!("dub-http-client/{}", env!("CARGO_PKG_VERSION")),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Create a new configuration builder.
    pub fn builder(api_key: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::new(api_key),
        }
    }

    /// Load configuration from `DUB_*` environment variables.
    ///
    /// `DUB_API_KEY` is required. Every other variable is an optional
    /// override; a variable that is set but unparsable is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = read_var(ENV_API_KEY).ok_or(ConfigError::Missing(ENV_API_KEY))?;
        let mut config = Self::new(api_key);

        if let Some(base_url) = read_var(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        if let Some(secs) = parse_var::<u64>(ENV_TIMEOUT_SECS)? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(threshold) = parse_var(ENV_CIRCUIT_BREAKER_THRESHOLD)? {
            config.circuit_breaker.failure_threshold = threshold;
        }
        if let Some(secs) = parse_var::<u64>(ENV_CIRCUIT_BREAKER_COOLDOWN_SECS)? {
            config.circuit_breaker.cooldown = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var(ENV_MAX_RATE_LIMIT_RETRIES)? {
            config.retry.max_rate_limit_retries = retries;
        }
        if let Some(retries) = parse_var(ENV_MAX_SERVER_ERROR_RETRIES)? {
            config.retry.max_server_error_retries = retries;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the client cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Validation("API key must not be empty".into()));
        }

        let url = url::Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Validation(format!("base URL {:?}: {e}", self.base_url)))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::Validation(format!(
                "base URL must use http or https, got {}",
                url.scheme()
            )));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::Validation("timeout must be non-zero".into()));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Validation(
                "circuit breaker threshold must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .field("user_agent", &self.user_agent)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("retry", &self.retry)
            .finish()
    }
}

fn read_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match read_var(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(None),
    }
}

/// Builder for client configuration.
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Set the overall per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection pool idle timeout.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum idle connections per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set circuit breaker configuration.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = config;
        self
    }

    /// Set retry configuration.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.config.retry = config;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
