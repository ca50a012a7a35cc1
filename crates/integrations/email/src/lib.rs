//! Email delivery backends.
//!
//! The mailer renders messages and hands them to an [`EmailBackend`]:
//! SMTP via `lettre` in production, or the stub backend which logs and
//! acknowledges acceptance when no transport is configured. A missing
//! transport must never fail ingestion.

pub mod backend;
pub mod config;
pub mod smtp;
pub mod stub;

pub use backend::{EmailBackend, EmailMessage, EmailResult};
pub use config::SmtpConfig;
pub use smtp::SmtpBackend;
pub use stub::StubBackend;
