//! Circuit breaker guarding the remote API.
//!
//! # States
//! - Closed: normal operation, every request is permitted
//! - Open: the API is assumed down, requests fail fast until the cooldown elapses
//! - Half-Open: exactly one probe request tests whether the API recovered
//!
//! # State Transitions
//! ```text
//! Closed   → Open:     consecutive server errors reach the threshold
//! Open     → HalfOpen: first permission check after the cooldown (becomes the probe)
//! HalfOpen → Closed:   probe gets a success or a non-429 client error
//! HalfOpen → Open:     probe gets a server error
//! ```
//!
//! All fields live behind one mutex. A permission check and an outcome update
//! are each a single short critical section; the transport call happens
//! outside the lock.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};

/// Consecutive server errors that open the circuit.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// How long the circuit stays open before probing.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests are allowed.
    Closed,
    /// Circuit is open, requests are rejected.
    Open,
    /// Circuit is half-open, a single probe is allowed.
    HalfOpen,
}

impl CircuitState {
    /// Get the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive server errors that open the circuit.
    pub failure_threshold: u32,
    /// Time the circuit stays open before a probe is allowed.
    pub cooldown: Duration,
    /// Whether connection-level failures count as server errors.
    pub count_transport_errors: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
            count_transport_errors: true,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new circuit breaker config.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            ..Default::default()
        }
    }

    /// Set whether connection-level failures trip the breaker.
    pub fn with_transport_errors(mut self, count: bool) -> Self {
        self.count_transport_errors = count;
        self
    }
}

/// Point-in-time view of the breaker, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Running count of server errors since the last success.
    pub consecutive_server_errors: u32,
    /// Most recent transition into `Open`, if any.
    pub opened_at: Option<Instant>,
    /// Whether a half-open probe is outstanding.
    pub probe_in_flight: bool,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_server_errors: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    /// Bumped whenever the circuit opens or is reset, so a permit can tell
    /// whether the half-open episode that issued it is still current.
    episode: u64,
}

impl Inner {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_server_errors: 0,
            opened_at: None,
            probe_in_flight: false,
            episode: 0,
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.probe_in_flight = false;
        self.episode = self.episode.wrapping_add(1);
    }
}

/// Circuit breaker shared by every call made through one client.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker in the closed state.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::closed()),
        }
    }

    /// Get the breaker configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Ask permission to make one transport attempt.
    ///
    /// An open circuit whose cooldown has elapsed moves to half-open and the
    /// caller becomes the probe. While the probe is outstanding every other
    /// caller is rejected exactly as if the circuit were open.
    pub fn try_acquire(&self) -> Result<Permit<'_>> {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false, inner.episode)),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.config.cooldown {
                    info!(
                        cooldown = ?self.config.cooldown,
                        "circuit breaker transitioning to half-open"
                    );
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(Permit::new(self, true, inner.episode))
                } else {
                    debug!(
                        remaining_cooldown = ?self.config.cooldown.saturating_sub(elapsed),
                        "circuit breaker is open"
                    );
                    Err(ClientError::CircuitOpen)
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    debug!("circuit breaker probe already in flight");
                    return Err(ClientError::CircuitOpen);
                }
                inner.probe_in_flight = true;
                Ok(Permit::new(self, true, inner.episode))
            }
        }
    }

    /// Record a success or a non-429 client error.
    ///
    /// Resets the error count and closes the circuit from any state.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::HalfOpen {
            info!("circuit breaker closing after successful half-open request");
        } else if inner.state == CircuitState::Open {
            info!("circuit breaker closing after late success");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_server_errors = 0;
        inner.probe_in_flight = false;
    }

    /// Record a server error, which may open the circuit.
    pub fn record_server_error(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        inner.consecutive_server_errors = inner.consecutive_server_errors.saturating_add(1);

        match inner.state {
            CircuitState::HalfOpen => {
                inner.open(now);
                warn!(
                    consecutive_5xx = inner.consecutive_server_errors,
                    "circuit breaker reopening after failed half-open request"
                );
            }
            CircuitState::Closed
                if inner.consecutive_server_errors >= self.config.failure_threshold =>
            {
                inner.open(now);
                warn!(
                    consecutive_5xx = inner.consecutive_server_errors,
                    threshold = self.config.failure_threshold,
                    "circuit breaker opening"
                );
            }
            _ => {}
        }
    }

    /// Get the current state without triggering any transition.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Get a consistent view of every breaker field.
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            state: inner.state,
            consecutive_server_errors: inner.consecutive_server_errors,
            opened_at: inner.opened_at,
            probe_in_flight: inner.probe_in_flight,
        }
    }

    /// Unconditionally return the breaker to the closed state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let episode = inner.episode.wrapping_add(1);
        *inner = Inner::closed();
        inner.episode = episode;
    }

    fn release_probe(&self, episode: u64) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen && inner.episode == episode {
            inner.probe_in_flight = false;
        }
    }
}

/// Permission to make one transport attempt.
///
/// The outcome is reported through the permit. A probe permit dropped without
/// an outcome (cancelled call, rate limit, unclassified status) frees the
/// half-open slot for the next caller, unless the circuit has since reopened
/// or been reset and the slot belongs to a newer probe.
#[derive(Debug)]
#[must_use = "a permit should report the outcome of its attempt"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
    episode: u64,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool, episode: u64) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
            episode,
        }
    }

    /// Whether this permit is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// Report a success or a non-429 client error.
    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    /// Report a server error.
    pub fn record_server_error(mut self) {
        self.settled = true;
        self.breaker.record_server_error();
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe(self.episode);
        }
    }
}
