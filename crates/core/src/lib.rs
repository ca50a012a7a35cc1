pub mod alert;
pub mod deployment;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod issue;
pub mod member;
pub mod project;
pub mod rule;
pub mod scrub;
pub mod types;

pub use alert::{AlertContext, AlertLinks, AlertPayload, Environments, IssueSummary};
pub use deployment::Deployment;
pub use error::FaultlineError;
pub use event::{ErrorEvent, StackFrame};
pub use fingerprint::compute_fingerprint;
pub use issue::{AssignmentChange, Issue, IssueStatus, Occurrence, StatusChange};
pub use member::{
    AlertPreferences, DigestCadence, DigestPreference, EmailMode, EmailPreference, QuietHours,
    TeamMember,
};
pub use project::{Project, ScrubPolicy, hash_api_key, key_preview};
pub use rule::{
    AlertRule, ChannelKind, ChannelTarget, EscalationLevelConfig, EscalationPolicy, FilterField,
    FilterGroup, FilterLeaf, FilterNode, FilterOperator, RuleKind,
};
pub use scrub::sanitize_event;
pub use types::{AlertId, IssueId, ProjectId, RuleId, Severity};
