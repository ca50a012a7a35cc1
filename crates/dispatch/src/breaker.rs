use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use faultline_provider::ProviderError;

/// Configuration for a per-endpoint circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit rejects calls after opening.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(300),
        }
    }
}

/// Observable state of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow through.
    Closed,
    /// Requests are rejected until the cooldown elapses.
    Open,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// In-process circuit breaker for a single endpoint.
///
/// `Closed -> Open` when consecutive failures reach the threshold; while
/// open, calls are rejected with [`ProviderError::CircuitOpen`] until the
/// cooldown elapses, after which one call is let through as a probe. A
/// successful call resets the counter and closes the circuit.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask permission to make a call.
    pub fn try_acquire(&self) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed());
                if elapsed.is_some_and(|e| e >= self.config.cooldown) {
                    // Cooldown over: let one probe through. The circuit stays
                    // open until record_success closes it.
                    inner.opened_at = Some(Instant::now());
                    Ok(())
                } else {
                    Err(ProviderError::CircuitOpen)
                }
            }
        }
    }

    /// Record a successful call: resets the counter and closes the circuit.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::Open {
            info!("circuit closed after successful probe");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Record a failed call, possibly opening the circuit.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.config.failure_threshold
            && inner.state == CircuitState::Closed
        {
            warn!(
                failures = inner.consecutive_failures,
                "circuit opened after consecutive failures"
            );
            inner.state = CircuitState::Open;
        }
        if inner.state == CircuitState::Open {
            inner.opened_at = Some(Instant::now());
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
