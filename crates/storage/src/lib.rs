//! Repository traits and in-memory implementations.
//!
//! The ingestion database proper is an external collaborator; these
//! repositories are the contract the pipeline consumes, plus the
//! in-process implementations the server and tests run against.

pub mod digest;
pub mod error;
pub mod memory;
pub mod store;

pub use digest::DigestEntry;
pub use error::StorageError;
pub use memory::{
    MemoryDeploymentStore, MemoryDigestQueue, MemoryIssueStore, MemoryMemberStore,
    MemoryOccurrenceStore, MemoryProjectStore, MemoryRuleStore,
};
pub use store::{
    DeploymentStore, DigestQueueStore, IssueStore, MemberStore, OccurrenceStore, ProjectStore,
    RuleStore,
};
