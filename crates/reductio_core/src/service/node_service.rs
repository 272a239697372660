//! Node use-case service.
//!
//! # Responsibility
//! - Create, update and delete nodes with every rule checked before a file
//!   is written.
//! - Serve read-only queries: chain, hollow chains, related, audit.
//!
//! # Invariants
//! - Every call loads the vault fresh; nothing is cached between calls.
//! - A rejected operation writes nothing.
//! - Auto-fix deletes exactly the set a dry run reports.

use crate::config::{Clock, SystemClock, VaultConfig};
use crate::error::{GraphError, GraphResult};
use crate::model::graph::Graph;
use crate::model::node::{Level, Node, Slug, Status};
use crate::model::tags::TagVocabulary;
use crate::repo::frontmatter::normalize_reference;
use crate::repo::node_repo::{path_to_meta, NodeRepository};
use crate::search::related::{find_related, RelatedQuery, RelatedResult};
use crate::service::chain::{build_chain, find_hollow_chains, ChainLink, HollowChain};
use crate::service::integrity::{plan_auto_fix, scan, IntegrityReport};
use crate::service::rules::{check_delete, check_status_change, check_tags};
use crate::service::validator::validate_reductions;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

/// Attributes for a new node.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub title: String,
    pub level: Level,
    pub proposition: String,
    pub reduces_to: Vec<String>,
    pub tags: Vec<String>,
    /// Explicit initial status; `None` means tentative (validated for
    /// bedrock).
    pub status: Option<Status>,
    /// Creation instant; `None` uses the service clock.
    pub created: Option<DateTime<Utc>>,
}

impl NewNode {
    pub fn new(title: impl Into<String>, level: Level, proposition: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            level,
            proposition: proposition.into(),
            reduces_to: Vec::new(),
            tags: Vec::new(),
            status: None,
            created: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedNode {
    pub slug: Slug,
    /// Vault-relative, `/` separated.
    pub path: String,
}

/// Partial field changes for one node.
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub status: Option<Status>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
    pub add_reduces_to: Vec<String>,
    pub remove_reduces_to: Vec<String>,
}

/// One change actually applied by an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum AppliedChange {
    StatusChanged { from: Status, to: Status },
    /// Status dropped to tentative because the last reduction was removed.
    StatusForced { from: Status, to: Status },
    TagAdded { tag: String },
    TagRemoved { tag: String },
    ReductionAdded { target: Slug },
    ReductionRemoved { target: Slug },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub slug: Slug,
    pub changes: Vec<AppliedChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedNode {
    pub slug: Slug,
    pub path: String,
}

/// File excluded from the graph during load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditOptions {
    /// Delete abandoned drafts.
    pub fix: bool,
    /// With `fix`, report the deletion set without deleting.
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditOutcome {
    pub report: IntegrityReport,
    pub skipped: Vec<SkippedFile>,
    /// Abandoned drafts selected by the auto-fix rule.
    pub fix_candidates: Vec<Slug>,
    /// Actually deleted; empty unless `fix` without `dry_run`.
    pub deleted: Vec<Slug>,
    pub dry_run: bool,
}

/// Node service facade over a repository.
pub struct NodeService<R: NodeRepository> {
    repo: R,
    config: VaultConfig,
    vocabulary: Box<dyn TagVocabulary>,
    clock: Box<dyn Clock>,
}

impl<R: NodeRepository> NodeService<R> {
    /// Creates a service using the wall clock.
    pub fn new(repo: R, config: VaultConfig, vocabulary: impl TagVocabulary + 'static) -> Self {
        Self {
            repo,
            config,
            vocabulary: Box::new(vocabulary),
            clock: Box::new(SystemClock),
        }
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Loads the current graph, logging skipped files.
    pub fn load_graph(&self) -> GraphResult<Graph> {
        Ok(self.repo.load_all()?.graph)
    }

    /// Creates one node after validating level, edges, tags and status.
    ///
    /// # Errors
    /// - `InvalidInput` for a blank title.
    /// - `RogueTag` for tags outside the vocabulary.
    /// - `MissingReduction` for a non-bedrock node without parents.
    /// - Validator errors for any bad edge.
    /// - `BedrockStatus` for an explicit status on bedrock.
    /// - `UnvalidatedParent` when created as validated on tentative parents.
    /// - `DuplicateSlug` when the slug is taken.
    pub fn create_node(&self, input: NewNode) -> GraphResult<CreatedNode> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(GraphError::InvalidInput("title must not be blank".to_string()));
        }
        let tags = dedupe(input.tags.iter().map(|tag| tag.trim().to_string()));
        check_tags(&*self.vocabulary, None, &tags)?;

        let graph = self.load_graph()?;
        let created = input.created.unwrap_or_else(|| truncate_to_seconds(self.clock.now()));
        let mut node = Node::new(title, input.level, input.proposition.trim(), created);
        node.tags = tags;
        node.reduces_to = dedupe(
            input
                .reduces_to
                .iter()
                .filter_map(|raw| normalize_reference(raw)),
        );

        if graph.contains(&node.slug) {
            return Err(GraphError::DuplicateSlug(node.slug));
        }
        if !node.is_bedrock() && node.reduces_to.is_empty() {
            return Err(GraphError::MissingReduction(node.slug));
        }
        validate_reductions(&graph, &node.slug, node.level, &node.reduces_to)?;

        if let Some(status) = input.status {
            check_status_change(&graph, &node, status)?;
            node.set_status(status);
        }

        self.repo.create_node(&node)?;
        info!(
            "event=node_create module=service status=ok slug={} level={} reductions={}",
            node.slug,
            node.level,
            node.reduces_to.len()
        );
        Ok(CreatedNode {
            path: path_to_meta(&node.path),
            slug: node.slug,
        })
    }

    /// Applies partial changes to the node `query` resolves to.
    ///
    /// Order: tags, removed edges, added edges, then status. Removing the
    /// last edge of a non-bedrock node forces it back to tentative.
    pub fn update_node(&self, query: &str, update: NodeUpdate) -> GraphResult<UpdateOutcome> {
        let graph = self.load_graph()?;
        let original = graph.resolve(query)?;
        let mut node = original.clone();
        let mut changes = Vec::new();

        let add_tags = dedupe(update.add_tags.iter().map(|tag| tag.trim().to_string()));
        check_tags(&*self.vocabulary, Some(node.slug.as_str()), &add_tags)?;
        for tag in add_tags {
            if !node.tags.contains(&tag) {
                node.tags.push(tag.clone());
                changes.push(AppliedChange::TagAdded { tag });
            }
        }
        for tag in update.remove_tags.iter().map(|tag| tag.trim()) {
            if let Some(index) = node.tags.iter().position(|existing| existing == tag) {
                let removed = node.tags.remove(index);
                changes.push(AppliedChange::TagRemoved { tag: removed });
            }
        }

        let had_reductions = !node.reduces_to.is_empty();
        for target in update
            .remove_reduces_to
            .iter()
            .filter_map(|raw| normalize_reference(raw))
        {
            if let Some(index) = node.reduces_to.iter().position(|existing| *existing == target) {
                node.reduces_to.remove(index);
                changes.push(AppliedChange::ReductionRemoved { target });
            }
        }

        let additions: Vec<Slug> = dedupe(
            update
                .add_reduces_to
                .iter()
                .filter_map(|raw| normalize_reference(raw)),
        )
        .into_iter()
        .filter(|target| !node.reduces_to.contains(target))
        .collect();
        validate_reductions(&graph, &node.slug, node.level, &additions)?;
        for target in additions {
            node.reduces_to.push(target.clone());
            changes.push(AppliedChange::ReductionAdded { target });
        }

        if !node.is_bedrock()
            && had_reductions
            && node.reduces_to.is_empty()
            && node.status() == Status::Validated
        {
            node.set_status(Status::Tentative);
            changes.push(AppliedChange::StatusForced {
                from: Status::Validated,
                to: Status::Tentative,
            });
        }

        if let Some(next) = update.status {
            check_status_change(&graph, &node, next)?;
            let current = node.status();
            if current != next {
                node.set_status(next);
                changes.push(AppliedChange::StatusChanged {
                    from: current,
                    to: next,
                });
            }
        }

        if !changes.is_empty() {
            self.repo.save_node(&node)?;
        }
        info!(
            "event=node_update module=service status=ok slug={} changes={}",
            node.slug,
            changes.len()
        );
        Ok(UpdateOutcome {
            slug: node.slug,
            changes,
        })
    }

    /// Deletes a node immediately, unless it is validated with dependents.
    pub fn delete_node(&self, query: &str) -> GraphResult<DeletedNode> {
        let graph = self.load_graph()?;
        let node = graph.resolve(query)?;
        check_delete(&graph, node)?;
        self.repo.remove_file(&node.path)?;
        info!(
            "event=node_delete module=service status=ok slug={}",
            node.slug
        );
        Ok(DeletedNode {
            slug: node.slug.clone(),
            path: path_to_meta(&node.path),
        })
    }

    /// Proof tree rooted at the node `query` resolves to.
    pub fn chain(&self, query: &str) -> GraphResult<ChainLink> {
        let graph = self.load_graph()?;
        let root = graph.resolve(query)?;
        build_chain(&graph, &root.slug, self.config.max_chain_depth)
    }

    pub fn hollow_chains(&self) -> GraphResult<Vec<HollowChain>> {
        let graph = self.load_graph()?;
        Ok(find_hollow_chains(&graph))
    }

    /// Connectivity search; `None` bounds fall back to config defaults.
    pub fn related(
        &self,
        query: &str,
        max_hops: Option<usize>,
        limit: Option<usize>,
    ) -> GraphResult<RelatedResult> {
        let graph = self.load_graph()?;
        let request = RelatedQuery {
            query: query.to_string(),
            max_hops: max_hops.unwrap_or(self.config.related_max_hops),
            limit: limit.unwrap_or(self.config.related_limit),
        };
        find_related(&graph, &request)
    }

    /// Read-only integrity scan.
    pub fn scan(&self) -> GraphResult<IntegrityReport> {
        Ok(self.audit(AuditOptions::default())?.report)
    }

    /// Integrity scan with optional auto-fix.
    ///
    /// Deletions are sequential and not transactional: a failure part way
    /// leaves earlier deletions in place and returns the error.
    pub fn audit(&self, options: AuditOptions) -> GraphResult<AuditOutcome> {
        let load = self.repo.load_all()?;
        let now = self.clock.now();
        let stale_after = self.config.stale_after();
        let report = scan(&load.graph, &*self.vocabulary, now, stale_after);
        let fix_candidates = if options.fix {
            plan_auto_fix(&load.graph, now, stale_after)
        } else {
            Vec::new()
        };

        let mut deleted = Vec::new();
        if options.fix && !options.dry_run {
            for slug in &fix_candidates {
                let Some(node) = load.graph.get(slug) else {
                    continue;
                };
                self.repo.remove_file(&node.path)?;
                warn!(
                    "event=auto_fix_delete module=service status=ok slug={}",
                    slug
                );
                deleted.push(slug.clone());
            }
        }

        info!(
            "event=audit module=service status=ok nodes={} issues={} candidates={} deleted={} dry_run={}",
            report.nodes_scanned,
            report.issues.len(),
            fix_candidates.len(),
            deleted.len(),
            options.dry_run
        );
        Ok(AuditOutcome {
            report,
            skipped: load
                .skipped
                .into_iter()
                .map(|record| SkippedFile {
                    path: path_to_meta(&record.path),
                    reason: record.reason,
                })
                .collect(),
            fix_candidates,
            deleted,
            dry_run: options.dry_run,
        })
    }
}

/// Keeps first occurrences, dropping blanks.
fn dedupe(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

fn truncate_to_seconds(value: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(value.timestamp(), 0).unwrap_or(value)
}
