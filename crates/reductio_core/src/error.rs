//! Engine error taxonomy.
//!
//! # Responsibility
//! - Name every rule violation the engine can detect.
//! - Carry enough context (slugs, levels, paths) to act without re-reading
//!   source files.
//! - Map each failure to a flat [`ErrorKind`] and a stable exit code.
//!
//! # Invariants
//! - Errors propagate immediately; the engine never auto-repairs.

use crate::model::node::{Level, Slug};
use crate::repo::node_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type for engine operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Flat error classification for callers mapping outcomes to exit signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    LevelMismatch,
    CycleDetected,
    RogueTag,
    MissingReduction,
    UnvalidatedParent,
    DeleteBlocked,
    AmbiguousMatch,
    DuplicateSlug,
    AlreadyMerged,
    NotAMerge,
    MalformedRecord,
    StoreUnavailable,
    BedrockStatus,
    AlreadyGrouped,
    GroupTooSmall,
    InvalidInput,
    IntegrityViolation,
}

impl ErrorKind {
    /// Stable process exit code. `0` is reserved for success and `1` for
    /// failures outside this taxonomy.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::NotFound => 2,
            Self::LevelMismatch => 3,
            Self::CycleDetected => 4,
            Self::RogueTag => 5,
            Self::MissingReduction => 6,
            Self::UnvalidatedParent => 7,
            Self::DeleteBlocked => 8,
            Self::AmbiguousMatch => 9,
            Self::DuplicateSlug => 10,
            Self::AlreadyMerged => 11,
            Self::NotAMerge => 12,
            Self::MalformedRecord => 13,
            Self::StoreUnavailable => 14,
            Self::BedrockStatus => 15,
            Self::AlreadyGrouped => 16,
            Self::GroupTooSmall => 17,
            Self::InvalidInput => 18,
            Self::IntegrityViolation => 19,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::LevelMismatch => "level_mismatch",
            Self::CycleDetected => "cycle_detected",
            Self::RogueTag => "rogue_tag",
            Self::MissingReduction => "missing_reduction",
            Self::UnvalidatedParent => "unvalidated_parent",
            Self::DeleteBlocked => "delete_blocked",
            Self::AmbiguousMatch => "ambiguous_match",
            Self::DuplicateSlug => "duplicate_slug",
            Self::AlreadyMerged => "already_merged",
            Self::NotAMerge => "not_a_merge",
            Self::MalformedRecord => "malformed_record",
            Self::StoreUnavailable => "store_unavailable",
            Self::BedrockStatus => "bedrock_status",
            Self::AlreadyGrouped => "already_grouped",
            Self::GroupTooSmall => "group_too_small",
            Self::InvalidInput => "invalid_input",
            Self::IntegrityViolation => "integrity_violation",
        }
    }
}

/// Errors raised by validation, rule checks and service orchestration.
#[derive(Debug)]
pub enum GraphError {
    /// Referenced node (or group) is absent.
    NotFound(String),
    /// Edge does not strictly decrease in rank.
    LevelMismatch {
        source: Slug,
        source_level: Level,
        target: Slug,
        target_level: Level,
    },
    /// Edge would close a loop: `target` already reaches `source`.
    CycleDetected { source: Slug, target: Slug },
    /// Tag outside the controlled vocabulary.
    RogueTag { slug: Option<Slug>, tag: String },
    /// Non-bedrock node with no parents.
    MissingReduction(Slug),
    /// Promotion attempted while direct parents are still tentative.
    UnvalidatedParent { slug: Slug, tentative: Vec<Slug> },
    /// Validated node still has dependents.
    DeleteBlocked { slug: Slug, dependents: Vec<Slug> },
    /// Fuzzy lookup matched several nodes.
    AmbiguousMatch { query: String, candidates: Vec<Slug> },
    DuplicateSlug(Slug),
    /// Node was already absorbed into `merged_into`.
    AlreadyMerged { slug: Slug, merged_into: Slug },
    /// Undo requested on a node without merge metadata.
    NotAMerge(Slug),
    /// Persisted record or config file cannot be parsed.
    MalformedRecord { path: String, message: String },
    /// Underlying storage cannot be reached.
    StoreUnavailable { path: String, message: String },
    /// Status is derived for bedrock nodes and cannot be set.
    BedrockStatus(Slug),
    /// Node already carries a deduplication group.
    AlreadyGrouped { slug: Slug, group: String },
    /// Grouping or merging needs at least two distinct nodes.
    GroupTooSmall(usize),
    /// Caller-supplied value rejected before any rule runs.
    InvalidInput(String),
    /// A consolidation step would introduce structural defects.
    IntegrityViolation { operation: &'static str, issues: Vec<String> },
}

impl GraphError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::LevelMismatch { .. } => ErrorKind::LevelMismatch,
            Self::CycleDetected { .. } => ErrorKind::CycleDetected,
            Self::RogueTag { .. } => ErrorKind::RogueTag,
            Self::MissingReduction(_) => ErrorKind::MissingReduction,
            Self::UnvalidatedParent { .. } => ErrorKind::UnvalidatedParent,
            Self::DeleteBlocked { .. } => ErrorKind::DeleteBlocked,
            Self::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            Self::DuplicateSlug(_) => ErrorKind::DuplicateSlug,
            Self::AlreadyMerged { .. } => ErrorKind::AlreadyMerged,
            Self::NotAMerge(_) => ErrorKind::NotAMerge,
            Self::MalformedRecord { .. } => ErrorKind::MalformedRecord,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            Self::BedrockStatus(_) => ErrorKind::BedrockStatus,
            Self::AlreadyGrouped { .. } => ErrorKind::AlreadyGrouped,
            Self::GroupTooSmall(_) => ErrorKind::GroupTooSmall,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::IntegrityViolation { .. } => ErrorKind::IntegrityViolation,
        }
    }
}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::LevelMismatch {
                source,
                source_level,
                target,
                target_level,
            } => write!(
                f,
                "level mismatch: {source} ({source_level}, rank {}) cannot reduce to {target} ({target_level}, rank {}); rank must strictly decrease",
                source_level.rank(),
                target_level.rank()
            ),
            Self::CycleDetected { source, target } => write!(
                f,
                "cycle detected: {target} already reaches {source}, so {source} -> {target} would close a loop"
            ),
            Self::RogueTag { slug: Some(slug), tag } => {
                write!(f, "rogue tag `{tag}` on {slug}: not in the controlled vocabulary")
            }
            Self::RogueTag { slug: None, tag } => {
                write!(f, "rogue tag `{tag}`: not in the controlled vocabulary")
            }
            Self::MissingReduction(slug) => write!(
                f,
                "missing reduction: {slug} is not bedrock and must reduce to at least one node"
            ),
            Self::UnvalidatedParent { slug, tentative } => write!(
                f,
                "cannot validate {slug}: tentative parents {}",
                tentative.join(", ")
            ),
            Self::DeleteBlocked { slug, dependents } => write!(
                f,
                "cannot delete validated {slug}: depended on by {}",
                dependents.join(", ")
            ),
            Self::AmbiguousMatch { query, candidates } => write!(
                f,
                "`{query}` matches several nodes: {}",
                candidates.join(", ")
            ),
            Self::DuplicateSlug(slug) => write!(f, "slug already exists: {slug}"),
            Self::AlreadyMerged { slug, merged_into } => {
                write!(f, "{slug} was already merged into {merged_into}")
            }
            Self::NotAMerge(slug) => write!(f, "{slug} carries no merge metadata"),
            Self::MalformedRecord { path, message } => {
                write!(f, "malformed record `{path}`: {message}")
            }
            Self::StoreUnavailable { path, message } => {
                write!(f, "store unavailable at `{path}`: {message}")
            }
            Self::BedrockStatus(slug) => {
                write!(f, "status of bedrock node {slug} is always validated")
            }
            Self::AlreadyGrouped { slug, group } => {
                write!(f, "{slug} already belongs to deduplication group {group}")
            }
            Self::GroupTooSmall(count) => {
                write!(f, "need at least two distinct nodes, got {count}")
            }
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::IntegrityViolation { operation, issues } => write!(
                f,
                "{operation} would introduce integrity issues: {}",
                issues.join("; ")
            ),
        }
    }
}

impl Error for GraphError {}

impl From<RepoError> for GraphError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Unavailable { path, source } => Self::StoreUnavailable {
                path: path.display().to_string(),
                message: source.to_string(),
            },
            RepoError::Io { path, source } => Self::StoreUnavailable {
                path: path.display().to_string(),
                message: source.to_string(),
            },
            RepoError::Malformed { path, message } => Self::MalformedRecord {
                path: path.display().to_string(),
                message,
            },
            RepoError::DuplicateSlug(slug) => Self::DuplicateSlug(slug),
            RepoError::NotFound(path) => Self::NotFound(path.display().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;

    #[test]
    fn exit_codes_are_distinct_and_non_zero() {
        let kinds = [
            ErrorKind::NotFound,
            ErrorKind::LevelMismatch,
            ErrorKind::CycleDetected,
            ErrorKind::RogueTag,
            ErrorKind::MissingReduction,
            ErrorKind::UnvalidatedParent,
            ErrorKind::DeleteBlocked,
            ErrorKind::AmbiguousMatch,
            ErrorKind::DuplicateSlug,
            ErrorKind::AlreadyMerged,
            ErrorKind::NotAMerge,
            ErrorKind::MalformedRecord,
            ErrorKind::StoreUnavailable,
            ErrorKind::BedrockStatus,
            ErrorKind::AlreadyGrouped,
            ErrorKind::GroupTooSmall,
            ErrorKind::InvalidInput,
            ErrorKind::IntegrityViolation,
        ];
        let codes: HashSet<i32> = kinds.iter().map(|kind| kind.exit_code()).collect();
        assert_eq!(codes.len(), kinds.len());
        assert!(!codes.contains(&0));
        assert!(!codes.contains(&1));
    }

    #[test]
    fn repo_errors_map_to_taxonomy() {
        let malformed: GraphError = RepoError::Malformed {
            path: PathBuf::from("rules/x.md"),
            message: "missing level".to_string(),
        }
        .into();
        assert_eq!(malformed.kind(), ErrorKind::MalformedRecord);
        assert!(malformed.to_string().contains("rules/x.md"));

        let duplicate: GraphError = RepoError::DuplicateSlug("s".to_string()).into();
        assert_eq!(duplicate.kind(), ErrorKind::DuplicateSlug);
    }

    #[test]
    fn level_mismatch_message_names_both_nodes() {
        let err = GraphError::LevelMismatch {
            source: "p".to_string(),
            source_level: Level::Percept,
            target: "a".to_string(),
            target_level: Level::Axiom,
        };
        let message = err.to_string();
        assert!(message.contains("p (percept, rank 0)"));
        assert!(message.contains("a (axiom, rank 0)"));
    }
}
