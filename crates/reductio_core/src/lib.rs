//! Core engine for reductio vaults.
//! This crate owns the reduction invariant and every rule built on it.

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;

pub use config::{Clock, FixedClock, SystemClock, VaultConfig, CONFIG_FILE_NAME};
pub use error::{ErrorKind, GraphError, GraphResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::graph::Graph;
pub use model::node::{Level, MergeStamp, MergedFrom, Node, Slug, Status};
pub use model::tags::{PermissiveVocabulary, StaticTagVocabulary, TagVocabulary};
pub use repo::node_repo::{
    FsNodeRepository, LoadReport, NodeRepository, RepoError, RepoResult, SkippedRecord,
};
pub use search::related::{
    EntryPoint, Relation, RelatedHit, RelatedQuery, RelatedResult, SeedKind,
};
pub use service::chain::{ChainLink, HollowChain};
pub use service::consolidation::{
    ConsolidationService, GroupOutcome, GroupSummary, MergeOutcome, MergeRequest, UndoOutcome,
};
pub use service::integrity::{IntegrityIssue, IntegrityReport};
pub use service::node_service::{
    AppliedChange, AuditOptions, AuditOutcome, CreatedNode, DeletedNode, NewNode, NodeService,
    NodeUpdate, SkippedFile, UpdateOutcome,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
