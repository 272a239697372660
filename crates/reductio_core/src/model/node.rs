//! Node domain model.
//!
//! # Responsibility
//! - Define the canonical in-memory record for one persisted fact.
//! - Own rank ordering, slug derivation and bedrock status derivation.
//!
//! # Invariants
//! - Bedrock nodes (`axiom`, `percept`) always report `Status::Validated`,
//!   whatever value was stored for them.
//! - Rank strictly decreases along every `reduces_to` edge of a sound graph.
//! - `created` is the only source for age computations; file metadata is
//!   never consulted.
//!
//! # See also
//! - model/graph.rs for the slug-keyed node set.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Stable node identifier: `<YYYYMMDDHHMMSS>-<slugified title>`.
pub type Slug = String;

/// Timestamp prefix format used in slugs and file names.
pub const SLUG_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const SLUG_TIMESTAMP_CHARS: usize = 14;
const SLUG_TITLE_MAX_CHARS: usize = 60;

static NON_SLUG_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"));

/// Rank-bearing category of a node.
///
/// `Axiom` and `Percept` are co-equal bedrock ranks. Neither may reduce to
/// the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Philosophical bedrock.
    Axiom,
    /// Empirical bedrock.
    Percept,
    /// Induced from bedrock or other rules below it.
    Rule,
    /// Deduced from rules.
    Deduction,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::Axiom, Level::Percept, Level::Rule, Level::Deduction];

    pub fn rank(self) -> u8 {
        match self {
            Self::Axiom | Self::Percept => 0,
            Self::Rule => 1,
            Self::Deduction => 2,
        }
    }

    pub fn is_bedrock(self) -> bool {
        self.rank() == 0
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Axiom => "axiom",
            Self::Percept => "percept",
            Self::Rule => "rule",
            Self::Deduction => "deduction",
        }
    }

    /// Vault directory holding nodes of this level.
    pub fn directory(self) -> &'static str {
        match self {
            Self::Axiom => "axioms",
            Self::Percept => "percepts",
            Self::Rule => "rules",
            Self::Deduction => "deductions",
        }
    }

    /// Parses a persisted level value. Case and surrounding whitespace are
    /// ignored; anything else unknown yields `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "axiom" => Some(Self::Axiom),
            "percept" => Some(Self::Percept),
            "rule" => Some(Self::Rule),
            "deduction" => Some(Self::Deduction),
            _ => None,
        }
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Epistemic status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Validated,
    Tentative,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Tentative => "tentative",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "validated" => Some(Self::Validated),
            "tentative" => Some(Self::Tentative),
            _ => None,
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record kept on a canonical node for each member it replaced.
///
/// Paths are vault-relative with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedFrom {
    pub id: Slug,
    pub original_path: String,
    pub original_status: Status,
    pub trashed_path: String,
}

/// Back-reference stamped onto a member moved into the holding area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStamp {
    pub merged_into: Slug,
    pub original_path: String,
    pub original_status: Status,
}

/// Canonical in-memory node record.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub slug: Slug,
    /// Vault-relative file path.
    pub path: PathBuf,
    pub title: String,
    pub level: Level,
    /// Stored value only; read through [`Node::status`].
    stored_status: Status,
    /// Ordered, duplicate-free parent slugs.
    pub reduces_to: Vec<Slug>,
    pub tags: Vec<String>,
    pub proposition: String,
    pub created: DateTime<Utc>,
    pub deduplication_group: Option<String>,
    pub merged_from: Vec<MergedFrom>,
    pub merged_reason: Option<String>,
    pub merged_date: Option<DateTime<Utc>>,
    pub merge_stamp: Option<MergeStamp>,
}

impl Node {
    /// Creates a fresh tentative node with a slug derived from `created` and
    /// `title`. Bedrock nodes still report `Validated`.
    pub fn new(
        title: impl Into<String>,
        level: Level,
        proposition: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        let title = title.into();
        let slug = make_slug(created, &title);
        Self::with_slug(slug, title, level, proposition, created)
    }

    /// Creates a node with a caller-provided slug, e.g. one read from disk.
    ///
    /// The path defaults to `<level dir>/<slug>.md`.
    pub fn with_slug(
        slug: impl Into<Slug>,
        title: impl Into<String>,
        level: Level,
        proposition: impl Into<String>,
        created: DateTime<Utc>,
    ) -> Self {
        let slug = slug.into();
        let path = default_node_path(level, &slug);
        Self {
            slug,
            path,
            title: title.into(),
            level,
            stored_status: Status::Tentative,
            reduces_to: Vec::new(),
            tags: Vec::new(),
            proposition: proposition.into(),
            created,
            deduplication_group: None,
            merged_from: Vec::new(),
            merged_reason: None,
            merged_date: None,
            merge_stamp: None,
        }
    }

    /// Effective status. Bedrock is validated by definition.
    pub fn status(&self) -> Status {
        if self.level.is_bedrock() {
            Status::Validated
        } else {
            self.stored_status
        }
    }

    /// Stores a status value. Rule checks live in `service::rules`; this
    /// setter only records the value.
    pub fn set_status(&mut self, status: Status) {
        self.stored_status = status;
    }

    pub fn rank(&self) -> u8 {
        self.level.rank()
    }

    pub fn is_bedrock(&self) -> bool {
        self.level.is_bedrock()
    }

    pub fn is_validated(&self) -> bool {
        self.status() == Status::Validated
    }

    /// Whether this node is the product of a merge.
    pub fn is_canonical(&self) -> bool {
        !self.merged_from.is_empty()
    }

    /// Whether this node was absorbed into a canonical node.
    pub fn is_merged_member(&self) -> bool {
        self.merge_stamp.is_some()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created)
    }

    /// Returns the file name (`<slug>.md`).
    pub fn file_name(&self) -> String {
        format!("{}.md", self.slug)
    }

    /// Appends `slug` to `reduces_to` unless already present.
    pub fn add_reduction(&mut self, slug: &str) -> bool {
        if self.reduces_to.iter().any(|existing| existing == slug) {
            return false;
        }
        self.reduces_to.push(slug.to_string());
        true
    }

    /// Replaces every edge to `from` with `to`, keeping order and avoiding
    /// duplicates. Returns whether anything changed.
    pub fn retarget_reduction(&mut self, from: &str, to: &str) -> bool {
        if !self.reduces_to.iter().any(|existing| existing == from) {
            return false;
        }
        let mut rewritten: Vec<Slug> = Vec::with_capacity(self.reduces_to.len());
        for existing in self.reduces_to.drain(..) {
            let next = if existing == from { to.to_string() } else { existing };
            if !rewritten.contains(&next) {
                rewritten.push(next);
            }
        }
        self.reduces_to = rewritten;
        true
    }
}

/// Default vault-relative path for a node of `level` with `slug`.
pub fn default_node_path(level: Level, slug: &str) -> PathBuf {
    PathBuf::from(level.directory()).join(format!("{slug}.md"))
}

/// Normalizes a title into slug material: lowercase ASCII alphanumerics
/// joined by `-`, capped at 60 characters. Blank input yields `untitled`.
pub fn slugify_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let replaced = NON_SLUG_CHARS_RE.replace_all(&lowered, "-");
    let capped: String = replaced.trim_matches('-').chars().take(SLUG_TITLE_MAX_CHARS).collect();
    let trimmed = capped.trim_end_matches('-');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Builds the time-ordered slug for a node created at `created`.
pub fn make_slug(created: DateTime<Utc>, title: &str) -> Slug {
    format!(
        "{}-{}",
        created.format(SLUG_TIMESTAMP_FORMAT),
        slugify_title(title)
    )
}

/// Recovers the creation instant encoded in a slug prefix, if any.
pub fn slug_timestamp(slug: &str) -> Option<DateTime<Utc>> {
    let prefix = slug.get(..SLUG_TIMESTAMP_CHARS)?;
    chrono::NaiveDateTime::parse_from_str(prefix, SLUG_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
