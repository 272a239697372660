//! Deduplication: grouping, canonical merge and undo.
//!
//! # Responsibility
//! - Tag near-duplicate nodes of one rank with a transient group id.
//! - Replace a set of members with one canonical node, keeping an audit
//!   trail and moving members to the holding area.
//! - Reverse a merge from that audit trail.
//!
//! # Invariants
//! - Members are never deleted by consolidation, only moved.
//! - The post-merge and post-undo graphs are computed and checked in memory
//!   before the first file is touched. Checks only reject issues the
//!   operation itself would introduce. Undo always restores members, so
//!   broken links on their own edges are reported, not rejected.
//! - The file writes that follow are sequential and not transactional. An
//!   interruption part way can leave a canonical node next to members that
//!   were not moved yet, or referrers still pointing at moved members.
//!   Running `audit` afterwards surfaces the resulting broken links.

use crate::config::{Clock, SystemClock, VaultConfig};
use crate::error::{GraphError, GraphResult};
use crate::model::graph::Graph;
use crate::model::node::{Level, MergeStamp, MergedFrom, Node, Slug};
use crate::repo::node_repo::{path_to_meta, NodeRepository, RepoError};
use crate::service::integrity::{scan_structure, IntegrityIssue};
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use uuid::Uuid;

const GROUP_PREFIX: &str = "dg-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupOutcome {
    pub group: String,
    pub level: Level,
    pub members: Vec<Slug>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub group: String,
    pub level: Level,
    pub members: Vec<Slug>,
}

/// Merge input. `group` and `slugs` are combined.
#[derive(Debug, Clone, Default)]
pub struct MergeRequest {
    pub group: Option<String>,
    pub slugs: Vec<String>,
    pub title: String,
    pub proposition: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub canonical: Slug,
    pub path: String,
    pub members: Vec<MergedFrom>,
    /// Nodes whose edges were repointed at the canonical node.
    pub rewritten: Vec<Slug>,
    /// Structural issues present after the merge that predate it.
    pub remaining_issues: Vec<IntegrityIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndoOutcome {
    pub canonical: Slug,
    pub undone_path: String,
    pub restored: Vec<Slug>,
    /// Oldest restored member; former canonical references now point here.
    pub reference_target: Slug,
    pub rewritten: Vec<Slug>,
    pub remaining_issues: Vec<IntegrityIssue>,
}

/// Consolidation service facade over a repository.
pub struct ConsolidationService<R: NodeRepository> {
    repo: R,
    config: VaultConfig,
    clock: Box<dyn Clock>,
}

impl<R: NodeRepository> ConsolidationService<R> {
    pub fn new(repo: R, config: VaultConfig) -> Self {
        Self {
            repo,
            config,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Tags two or more same-rank nodes with a fresh group id.
    ///
    /// # Errors
    /// - `GroupTooSmall` for fewer than two distinct nodes.
    /// - `LevelMismatch` when ranks differ.
    /// - `AlreadyGrouped` when a node already carries a group.
    pub fn group(&self, queries: &[String]) -> GraphResult<GroupOutcome> {
        let graph = self.repo.load_all()?.graph;
        let members = resolve_members(&graph, queries)?;
        let level = check_same_level(&graph, &members)?;
        for slug in &members {
            if let Some(node) = graph.get(slug) {
                if let Some(group) = &node.deduplication_group {
                    return Err(GraphError::AlreadyGrouped {
                        slug: slug.clone(),
                        group: group.clone(),
                    });
                }
            }
        }

        let group = new_group_id();
        for slug in &members {
            if let Some(node) = graph.get(slug) {
                let mut node = node.clone();
                node.deduplication_group = Some(group.clone());
                self.repo.save_node(&node)?;
            }
        }
        info!(
            "event=group_create module=consolidation status=ok group={} members={}",
            group,
            members.len()
        );
        Ok(GroupOutcome {
            group,
            level,
            members,
        })
    }

    /// Clears a group id from every member.
    pub fn ungroup(&self, group: &str) -> GraphResult<Vec<Slug>> {
        let graph = self.repo.load_all()?.graph;
        let members = group_members(&graph, group);
        if members.is_empty() {
            return Err(GraphError::NotFound(group.to_string()));
        }
        for slug in &members {
            if let Some(node) = graph.get(slug) {
                let mut node = node.clone();
                node.deduplication_group = None;
                self.repo.save_node(&node)?;
            }
        }
        info!(
            "event=group_clear module=consolidation status=ok group={} members={}",
            group,
            members.len()
        );
        Ok(members)
    }

    /// Open groups with their members, ordered by group id.
    pub fn list_groups(&self) -> GraphResult<Vec<GroupSummary>> {
        let graph = self.repo.load_all()?.graph;
        let mut groups: BTreeMap<String, GroupSummary> = BTreeMap::new();
        for node in graph.nodes() {
            let Some(group) = &node.deduplication_group else {
                continue;
            };
            groups
                .entry(group.clone())
                .or_insert_with(|| GroupSummary {
                    group: group.clone(),
                    level: node.level,
                    members: Vec::new(),
                })
                .members
                .push(node.slug.clone());
        }
        Ok(groups.into_values().collect())
    }

    /// Replaces the requested members with one canonical node.
    ///
    /// The canonical node starts tentative, takes the first member's edges
    /// (minus edges into the member set) and the union of member tags.
    ///
    /// # Errors
    /// - `InvalidInput` for a blank title.
    /// - `NotFound` for an unknown group or node.
    /// - `GroupTooSmall`, `LevelMismatch`, `AlreadyMerged` for bad member
    ///   sets.
    /// - `DuplicateSlug` when the canonical slug is taken.
    /// - `IntegrityViolation` when the merged graph gains structural issues.
    pub fn merge(&self, request: MergeRequest) -> GraphResult<MergeOutcome> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(GraphError::InvalidInput(
                "canonical title must not be blank".to_string(),
            ));
        }

        let graph = self.repo.load_all()?.graph;
        let mut queries: Vec<String> = Vec::new();
        if let Some(group) = &request.group {
            let members = group_members(&graph, group);
            if members.is_empty() {
                return Err(GraphError::NotFound(group.clone()));
            }
            queries.extend(members);
        }
        queries.extend(request.slugs.iter().cloned());
        let member_slugs = resolve_members(&graph, &queries)?;
        let level = check_same_level(&graph, &member_slugs)?;
        check_not_merged(&graph, &member_slugs)?;

        let members: Vec<&Node> = member_slugs
            .iter()
            .filter_map(|slug| graph.get(slug))
            .collect();
        let member_set: HashSet<&str> = member_slugs.iter().map(String::as_str).collect();

        let now = self.now();
        let mut canonical = Node::new(title, level, request.proposition.trim(), now);
        if graph.contains(&canonical.slug) {
            return Err(GraphError::DuplicateSlug(canonical.slug));
        }
        if let Some(first) = members.first() {
            canonical.reduces_to = first
                .reduces_to
                .iter()
                .filter(|target| !member_set.contains(target.as_str()))
                .cloned()
                .collect();
        }
        for member in &members {
            for tag in &member.tags {
                if !canonical.tags.contains(tag) {
                    canonical.tags.push(tag.clone());
                }
            }
        }
        canonical.merged_reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .map(str::to_string);
        canonical.merged_date = Some(now);
        canonical.merged_from = members
            .iter()
            .map(|member| MergedFrom {
                id: member.slug.clone(),
                original_path: path_to_meta(&member.path),
                original_status: member.status(),
                trashed_path: path_to_meta(&self.holding_path(member)),
            })
            .collect();

        let mut staged = graph.clone();
        for slug in &member_slugs {
            staged.remove(slug);
        }
        staged.insert(canonical.clone());
        let mut rewritten: Vec<Slug> = Vec::new();
        for node in staged.nodes_mut() {
            if node.slug == canonical.slug {
                continue;
            }
            let mut changed = false;
            for slug in &member_slugs {
                changed |= node.retarget_reduction(slug, &canonical.slug);
            }
            if changed {
                rewritten.push(node.slug.clone());
            }
        }

        let renames: HashMap<Slug, Slug> = member_slugs
            .iter()
            .map(|slug| (slug.clone(), canonical.slug.clone()))
            .collect();
        let remaining_issues = check_staged(&graph, &staged, &renames, "merge", |_| false)?;

        self.repo.create_node(&canonical)?;
        for member in &members {
            let mut stamped = (*member).clone();
            stamped.merge_stamp = Some(MergeStamp {
                merged_into: canonical.slug.clone(),
                original_path: path_to_meta(&member.path),
                original_status: member.status(),
            });
            stamped.deduplication_group = None;
            stamped.path = self.holding_path(member);
            self.commit_step("merge", &canonical.slug, || {
                self.repo.move_file(&member.path, &stamped.path)?;
                self.repo.save_node(&stamped)
            })?;
        }
        for slug in &rewritten {
            if let Some(node) = staged.get(slug) {
                self.commit_step("merge", &canonical.slug, || self.repo.save_node(node))?;
            }
        }

        info!(
            "event=merge module=consolidation status=ok canonical={} members={} rewritten={}",
            canonical.slug,
            members.len(),
            rewritten.len()
        );
        Ok(MergeOutcome {
            path: path_to_meta(&canonical.path),
            canonical: canonical.slug,
            members: canonical.merged_from,
            rewritten,
            remaining_issues,
        })
    }

    /// Reverses a merge using the canonical node's audit trail.
    ///
    /// Members return to their original paths and statuses. References to
    /// the canonical node move to the oldest member by `created`, ties broken
    /// by slug.
    ///
    /// # Errors
    /// - `NotAMerge` when the node carries no `merged_from` trail.
    /// - `NotFound` when a member file is missing from the holding area.
    /// - `DuplicateSlug` when a member slug is live again.
    /// - `IntegrityViolation` when the restored graph gains structural
    ///   issues other than broken links on restored members, which are
    ///   returned in `remaining_issues`.
    pub fn undo(&self, query: &str) -> GraphResult<UndoOutcome> {
        let graph = self.repo.load_all()?.graph;
        let canonical = graph.resolve(query)?.clone();
        if canonical.merged_from.is_empty() {
            return Err(GraphError::NotAMerge(canonical.slug));
        }

        let mut restored: Vec<(PathBuf, Node)> = Vec::new();
        for record in &canonical.merged_from {
            let trashed_path = meta_to_path(&record.trashed_path);
            let mut member = self.repo.read_node(&trashed_path)?;
            if graph.contains(&member.slug) {
                return Err(GraphError::DuplicateSlug(member.slug));
            }
            member.merge_stamp = None;
            member.path = meta_to_path(&record.original_path);
            member.set_status(record.original_status);
            restored.push((trashed_path, member));
        }

        let reference_target = restored
            .iter()
            .map(|(_, member)| member)
            .min_by(|left, right| {
                left.created
                    .cmp(&right.created)
                    .then_with(|| left.slug.cmp(&right.slug))
            })
            .map(|member| member.slug.clone())
            .ok_or_else(|| GraphError::NotAMerge(canonical.slug.clone()))?;

        let mut staged = graph.clone();
        staged.remove(&canonical.slug);
        for (_, member) in &restored {
            staged.insert(member.clone());
        }
        let restored_slugs: HashSet<&str> = restored
            .iter()
            .map(|(_, member)| member.slug.as_str())
            .collect();
        let mut rewritten: Vec<Slug> = Vec::new();
        for node in staged.nodes_mut() {
            if restored_slugs.contains(node.slug.as_str()) {
                continue;
            }
            if node.retarget_reduction(&canonical.slug, &reference_target) {
                rewritten.push(node.slug.clone());
            }
        }

        let renames: HashMap<Slug, Slug> =
            [(canonical.slug.clone(), reference_target.clone())].into();
        // Parents of held members may have been deleted since the merge.
        // Those links are restored as found and left for `audit`.
        let remaining_issues = check_staged(&graph, &staged, &renames, "undo", |issue| {
            matches!(issue, IntegrityIssue::BrokenLink { slug, .. }
                if restored_slugs.contains(slug.as_str()))
        })?;

        let undone_path = self.config.undone_dir.join(canonical.file_name());
        self.repo.move_file(&canonical.path, &undone_path)?;
        for (trashed_path, member) in &restored {
            self.commit_step("undo", &canonical.slug, || {
                self.repo.move_file(trashed_path, &member.path)?;
                self.repo.save_node(member)
            })?;
        }
        for slug in &rewritten {
            if let Some(node) = staged.get(slug) {
                self.commit_step("undo", &canonical.slug, || self.repo.save_node(node))?;
            }
        }

        info!(
            "event=undo module=consolidation status=ok canonical={} restored={} rewritten={}",
            canonical.slug,
            restored.len(),
            rewritten.len()
        );
        Ok(UndoOutcome {
            canonical: canonical.slug,
            undone_path: path_to_meta(&undone_path),
            restored: restored
                .into_iter()
                .map(|(_, member)| member.slug)
                .collect(),
            reference_target,
            rewritten,
            remaining_issues,
        })
    }

    fn now(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
    }

    fn holding_path(&self, member: &Node) -> PathBuf {
        self.config.holding_dir.join(member.file_name())
    }

    /// Runs one post-validation write, logging which operation was cut short
    /// when it fails.
    fn commit_step<F>(&self, operation: &str, canonical: &str, step: F) -> GraphResult<()>
    where
        F: FnOnce() -> Result<(), RepoError>,
    {
        step().map_err(|err| {
            error!(
                "event={} module=consolidation status=error canonical={} partial=true error={}",
                operation, canonical, err
            );
            GraphError::from(err)
        })
    }
}

/// Resolves queries to distinct slugs, keeping first-seen order.
fn resolve_members(graph: &Graph, queries: &[String]) -> GraphResult<Vec<Slug>> {
    let mut members: Vec<Slug> = Vec::new();
    for query in queries {
        let node = graph.resolve(query)?;
        if !members.contains(&node.slug) {
            members.push(node.slug.clone());
        }
    }
    if members.len() < 2 {
        return Err(GraphError::GroupTooSmall(members.len()));
    }
    Ok(members)
}

fn check_same_level(graph: &Graph, members: &[Slug]) -> GraphResult<Level> {
    let nodes: Vec<&Node> = members.iter().filter_map(|slug| graph.get(slug)).collect();
    let Some(first) = nodes.first() else {
        return Err(GraphError::GroupTooSmall(0));
    };
    for node in &nodes[1..] {
        if node.level != first.level {
            return Err(GraphError::LevelMismatch {
                source: first.slug.clone(),
                source_level: first.level,
                target: node.slug.clone(),
                target_level: node.level,
            });
        }
    }
    Ok(first.level)
}

/// Rejects members already absorbed by a merge: stamped files put back by
/// hand, or slugs listed in a live canonical node's trail.
fn check_not_merged(graph: &Graph, members: &[Slug]) -> GraphResult<()> {
    for slug in members {
        if let Some(stamp) = graph.get(slug).and_then(|node| node.merge_stamp.as_ref()) {
            return Err(GraphError::AlreadyMerged {
                slug: slug.clone(),
                merged_into: stamp.merged_into.clone(),
            });
        }
        if let Some(canonical) = graph
            .nodes()
            .find(|node| node.merged_from.iter().any(|record| record.id == *slug))
        {
            return Err(GraphError::AlreadyMerged {
                slug: slug.clone(),
                merged_into: canonical.slug.clone(),
            });
        }
    }
    Ok(())
}

fn group_members(graph: &Graph, group: &str) -> Vec<Slug> {
    let group = group.trim();
    graph
        .nodes()
        .filter(|node| node.deduplication_group.as_deref() == Some(group))
        .map(|node| node.slug.clone())
        .collect()
}

/// Compares structural issues before and after a staged change.
///
/// Returns every issue present afterwards, or `IntegrityViolation` listing
/// the new ones `tolerated` does not accept.
fn check_staged<F>(
    before: &Graph,
    after: &Graph,
    renames: &HashMap<Slug, Slug>,
    operation: &'static str,
    tolerated: F,
) -> GraphResult<Vec<IntegrityIssue>>
where
    F: Fn(&IntegrityIssue) -> bool,
{
    let known: HashSet<IntegrityIssue> = scan_structure(before)
        .iter()
        .map(|issue| issue.renamed(renames))
        .collect();
    let after_issues = scan_structure(after);
    let introduced: Vec<String> = after_issues
        .iter()
        .filter(|issue| !known.contains(*issue) && !tolerated(issue))
        .map(ToString::to_string)
        .collect();
    if !introduced.is_empty() {
        error!(
            "event={} module=consolidation status=error reason=integrity issues={}",
            operation,
            introduced.len()
        );
        return Err(GraphError::IntegrityViolation {
            operation,
            issues: introduced,
        });
    }
    Ok(after_issues)
}

fn new_group_id() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("{GROUP_PREFIX}{}", &simple[..8])
}

fn meta_to_path(value: &str) -> PathBuf {
    value
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(PathBuf::new(), |path, part| path.join(part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::Status;

    #[test]
    fn group_ids_are_prefixed_and_short() {
        let id = new_group_id();
        assert!(id.starts_with("dg-"));
        assert_eq!(id.len(), 11);
    }

    #[test]
    fn meta_paths_split_on_forward_slash() {
        assert_eq!(
            meta_to_path(".merged/20260101000000-x.md"),
            PathBuf::from(".merged").join("20260101000000-x.md")
        );
    }

    #[test]
    fn status_survives_in_trail() {
        let record = MergedFrom {
            id: "x".into(),
            original_path: "rules/x.md".into(),
            original_status: Status::Validated,
            trashed_path: ".merged/x.md".into(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["original_status"], "validated");
    }
}
