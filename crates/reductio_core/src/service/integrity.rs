//! Full-graph integrity scanner.
//!
//! # Responsibility
//! - Audit every loaded node independently of any single operation.
//! - Detect cycles globally with Kahn-style in-degree consumption.
//! - Plan the narrow "abandoned draft" auto-fix.
//!
//! # Invariants
//! - Scanning never mutates the graph.
//! - The auto-fix plan depends only on the graph and the clock, so a dry run
//!   and a real run select the same set.

use crate::model::graph::Graph;
use crate::model::node::{Level, Node, Slug, Status};
use crate::model::tags::TagVocabulary;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::{Display, Formatter};

/// One defect found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    BrokenLink {
        slug: Slug,
        target: Slug,
    },
    LevelMismatch {
        slug: Slug,
        level: Level,
        target: Slug,
        target_level: Level,
    },
    MissingReduction {
        slug: Slug,
    },
    RogueTag {
        slug: Slug,
        tag: String,
    },
    Stale {
        slug: Slug,
        age_days: i64,
    },
    /// Left over by Kahn consumption: on a cycle or downstream of one.
    Cycle {
        slug: Slug,
    },
}

impl IntegrityIssue {
    /// Slug the issue is reported against.
    pub fn slug(&self) -> &str {
        match self {
            Self::BrokenLink { slug, .. }
            | Self::LevelMismatch { slug, .. }
            | Self::MissingReduction { slug }
            | Self::RogueTag { slug, .. }
            | Self::Stale { slug, .. }
            | Self::Cycle { slug } => slug,
        }
    }

    /// Structural issues break the reduction invariant; tag and staleness
    /// findings do not.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::BrokenLink { .. }
                | Self::LevelMismatch { .. }
                | Self::MissingReduction { .. }
                | Self::Cycle { .. }
        )
    }

    /// Copy with every slug mapped through `renames`.
    pub fn renamed(&self, renames: &HashMap<Slug, Slug>) -> Self {
        let map = |slug: &Slug| renames.get(slug).cloned().unwrap_or_else(|| slug.clone());
        match self {
            Self::BrokenLink { slug, target } => Self::BrokenLink {
                slug: map(slug),
                target: map(target),
            },
            Self::LevelMismatch {
                slug,
                level,
                target,
                target_level,
            } => Self::LevelMismatch {
                slug: map(slug),
                level: *level,
                target: map(target),
                target_level: *target_level,
            },
            Self::MissingReduction { slug } => Self::MissingReduction { slug: map(slug) },
            Self::RogueTag { slug, tag } => Self::RogueTag {
                slug: map(slug),
                tag: tag.clone(),
            },
            Self::Stale { slug, age_days } => Self::Stale {
                slug: map(slug),
                age_days: *age_days,
            },
            Self::Cycle { slug } => Self::Cycle { slug: map(slug) },
        }
    }
}

impl Display for IntegrityIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BrokenLink { slug, target } => write!(f, "{slug}: broken link to {target}"),
            Self::LevelMismatch {
                slug,
                level,
                target,
                target_level,
            } => write!(f, "{slug} ({level}) reduces to {target} ({target_level})"),
            Self::MissingReduction { slug } => write!(f, "{slug}: no reductions"),
            Self::RogueTag { slug, tag } => write!(f, "{slug}: rogue tag `{tag}`"),
            Self::Stale { slug, age_days } => {
                write!(f, "{slug}: tentative for {age_days} days")
            }
            Self::Cycle { slug } => write!(f, "{slug}: in or below a cycle"),
        }
    }
}

/// Scan result for the whole graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub nodes_scanned: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issue counts keyed by kind name.
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            let kind = match issue {
                IntegrityIssue::BrokenLink { .. } => "broken_link",
                IntegrityIssue::LevelMismatch { .. } => "level_mismatch",
                IntegrityIssue::MissingReduction { .. } => "missing_reduction",
                IntegrityIssue::RogueTag { .. } => "rogue_tag",
                IntegrityIssue::Stale { .. } => "stale",
                IntegrityIssue::Cycle { .. } => "cycle",
            };
            *counts.entry(kind).or_insert(0) += 1;
        }
        counts
    }
}

/// Runs the full audit.
///
/// Per-node issues come in slug order, followed by cycle members.
pub fn scan(
    graph: &Graph,
    vocabulary: &dyn TagVocabulary,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> IntegrityReport {
    let mut issues = Vec::new();
    for node in graph.nodes() {
        link_issues(graph, node, &mut issues);
        for tag in &node.tags {
            if !vocabulary.contains(tag) {
                issues.push(IntegrityIssue::RogueTag {
                    slug: node.slug.clone(),
                    tag: tag.clone(),
                });
            }
        }
        if is_stale(node, now, stale_after) {
            issues.push(IntegrityIssue::Stale {
                slug: node.slug.clone(),
                age_days: node.age(now).num_days(),
            });
        }
    }
    cycle_issues(graph, &mut issues);

    IntegrityReport {
        nodes_scanned: graph.len(),
        issues,
    }
}

/// Structural subset of [`scan`]: links, ranks, missing reductions, cycles.
pub fn scan_structure(graph: &Graph) -> Vec<IntegrityIssue> {
    let mut issues = Vec::new();
    for node in graph.nodes() {
        link_issues(graph, node, &mut issues);
    }
    cycle_issues(graph, &mut issues);
    issues
}

fn link_issues(graph: &Graph, node: &Node, issues: &mut Vec<IntegrityIssue>) {
    for target in &node.reduces_to {
        match graph.get(target) {
            None => issues.push(IntegrityIssue::BrokenLink {
                slug: node.slug.clone(),
                target: target.clone(),
            }),
            Some(parent) if node.rank() <= parent.rank() => {
                issues.push(IntegrityIssue::LevelMismatch {
                    slug: node.slug.clone(),
                    level: node.level,
                    target: target.clone(),
                    target_level: parent.level,
                })
            }
            Some(_) => {}
        }
    }
    if !node.is_bedrock() && node.reduces_to.is_empty() {
        issues.push(IntegrityIssue::MissingReduction {
            slug: node.slug.clone(),
        });
    }
}

fn cycle_issues(graph: &Graph, issues: &mut Vec<IntegrityIssue>) {
    for slug in find_cycle_members(graph) {
        issues.push(IntegrityIssue::Cycle { slug });
    }
}

/// Nodes left with non-zero in-degree after Kahn consumption.
///
/// Only edges between loaded nodes count. Nodes downstream of a cycle are
/// reported too, since their in-degree is never released.
pub fn find_cycle_members(graph: &Graph) -> Vec<Slug> {
    let mut in_degree: BTreeMap<&str, usize> = graph.slugs().map(|slug| (slug, 0)).collect();
    for node in graph.nodes() {
        for target in &node.reduces_to {
            if let Some(degree) = in_degree.get_mut(target.as_str()) {
                *degree += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(slug, _)| *slug)
        .collect();
    while let Some(slug) = queue.pop_front() {
        let Some(node) = graph.get(slug) else {
            continue;
        };
        for target in &node.reduces_to {
            if let Some(degree) = in_degree.get_mut(target.as_str()) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(target.as_str());
                }
            }
        }
    }

    in_degree
        .into_iter()
        .filter(|(_, degree)| *degree > 0)
        .map(|(slug, _)| slug.to_string())
        .collect()
}

fn is_stale(node: &Node, now: DateTime<Utc>, stale_after: Duration) -> bool {
    !node.is_bedrock() && node.status() == Status::Tentative && node.age(now) > stale_after
}

/// Abandoned drafts: tentative, no reductions, and stale. Nodes with a
/// partial chain are never selected.
pub fn plan_auto_fix(graph: &Graph, now: DateTime<Utc>, stale_after: Duration) -> Vec<Slug> {
    graph
        .nodes()
        .filter(|node| node.reduces_to.is_empty() && is_stale(node, now, stale_after))
        .map(|node| node.slug.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tags::StaticTagVocabulary;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap()
    }

    fn node(slug: &str, level: Level, parents: &[&str], created: DateTime<Utc>) -> Node {
        let mut node = Node::with_slug(slug, slug, level, "", created);
        node.reduces_to = parents.iter().map(|p| p.to_string()).collect();
        node
    }

    #[test]
    fn reports_each_defect_kind() {
        let mut rogue = node("r-rogue", Level::Rule, &["p"], at(30));
        rogue.tags = vec!["astrology".to_string()];
        let graph = Graph::from_nodes([
            node("p", Level::Percept, &[], at(1)),
            node("a", Level::Axiom, &["p"], at(1)),
            node("r-broken", Level::Rule, &["ghost"], at(30)),
            node("r-empty", Level::Rule, &[], at(30)),
            rogue,
        ]);
        let vocabulary = StaticTagVocabulary::new(["ethics"]);
        let report = scan(&graph, &vocabulary, at(31), Duration::days(14));

        assert!(report.issues.contains(&IntegrityIssue::LevelMismatch {
            slug: "a".into(),
            level: Level::Axiom,
            target: "p".into(),
            target_level: Level::Percept,
        }));
        assert!(report.issues.contains(&IntegrityIssue::BrokenLink {
            slug: "r-broken".into(),
            target: "ghost".into(),
        }));
        assert!(report
            .issues
            .contains(&IntegrityIssue::MissingReduction { slug: "r-empty".into() }));
        assert!(report.issues.contains(&IntegrityIssue::RogueTag {
            slug: "r-rogue".into(),
            tag: "astrology".into(),
        }));
        assert_eq!(report.counts().get("stale"), None);
        assert_eq!(report.nodes_scanned, 5);
    }

    #[test]
    fn staleness_uses_created_and_skips_bedrock() {
        let graph = Graph::from_nodes([
            node("p", Level::Percept, &[], at(1)),
            node("old", Level::Rule, &["p"], at(1)),
            node("fresh", Level::Rule, &["p"], at(20)),
        ]);
        let report = scan(&graph, &StaticTagVocabulary::default(), at(20), Duration::days(14));
        let stale: Vec<&str> = report
            .issues
            .iter()
            .filter(|issue| matches!(issue, IntegrityIssue::Stale { .. }))
            .map(IntegrityIssue::slug)
            .collect();
        assert_eq!(stale, vec!["old"]);
    }

    #[test]
    fn kahn_scan_reports_cycles_and_their_downstream() {
        let graph = Graph::from_nodes([
            node("p", Level::Percept, &[], at(1)),
            node("x", Level::Rule, &["y", "p"], at(1)),
            node("y", Level::Rule, &["x"], at(1)),
            node("z", Level::Deduction, &["x"], at(1)),
            node("self", Level::Rule, &["self"], at(1)),
        ]);
        let members = find_cycle_members(&graph);
        assert_eq!(members, vec!["p", "self", "x", "y"]);
    }

    #[test]
    fn acyclic_graph_has_no_cycle_members() {
        let graph = Graph::from_nodes([
            node("p", Level::Percept, &[], at(1)),
            node("r", Level::Rule, &["p"], at(1)),
            node("d", Level::Deduction, &["r", "p"], at(1)),
        ]);
        assert!(find_cycle_members(&graph).is_empty());
        assert!(scan_structure(&graph).is_empty());
    }

    #[test]
    fn auto_fix_selects_only_abandoned_drafts() {
        let mut validated = node("validated-empty", Level::Rule, &[], at(1));
        validated.set_status(Status::Validated);
        let graph = Graph::from_nodes([
            node("p", Level::Percept, &[], at(1)),
            node("draft", Level::Rule, &[], at(1)),
            node("partial", Level::Rule, &["p"], at(1)),
            node("young", Level::Rule, &[], at(25)),
            validated,
        ]);
        assert_eq!(
            plan_auto_fix(&graph, at(30), Duration::days(14)),
            vec!["draft".to_string()]
        );
    }

    #[test]
    fn renamed_maps_member_slugs() {
        let renames: HashMap<Slug, Slug> = [("old".to_string(), "new".to_string())].into();
        let issue = IntegrityIssue::BrokenLink {
            slug: "old".into(),
            target: "ghost".into(),
        };
        assert_eq!(
            issue.renamed(&renames),
            IntegrityIssue::BrokenLink {
                slug: "new".into(),
                target: "ghost".into(),
            }
        );
    }

    #[test]
    fn cycle_text_covers_nodes_below_the_loop() {
        let issue = IntegrityIssue::Cycle { slug: "p".into() };
        assert_eq!(issue.to_string(), "p: in or below a cycle");
    }
}
