pub mod entry;
pub mod error;
pub mod store;

pub use entry::{CooldownEntry, EscalationEntry, EscalationLevel};
pub use error::StateError;
pub use store::NotificationStateStore;
