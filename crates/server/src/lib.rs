//! The Faultline server library.
//!
//! The binary in `main.rs` loads configuration, assembles the pipeline,
//! and serves the HTTP surface. Everything is exported here so tests can
//! drive the router without a listening socket.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod retention;
pub mod state_factory;

pub use app::{AppState, build_router};
pub use config::{FileConfig, ServerConfig, StateDriver};
pub use error::ServerError;
pub use retention::{RetentionScheduler, RetentionSweeper};
