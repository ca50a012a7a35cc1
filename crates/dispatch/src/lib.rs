//! Channel dispatch.
//!
//! Fans one alert out to every configured channel sequentially, capturing
//! per-channel results; the failure of one channel never skips the rest.
//! Slack delivery runs behind a circuit breaker.

pub mod breaker;
pub mod dispatcher;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use dispatcher::{ChannelDispatchResult, ChannelDispatcher, DispatchFailure, DispatchSummary};
