//! Status transition and delete eligibility rules.
//!
//! # Invariants
//! - Promotion checks direct parents only (one hop).
//! - Demotion is unrestricted.
//! - Bedrock status is derived and never settable.
//! - A validated node with dependents cannot be deleted.

use crate::error::{GraphError, GraphResult};
use crate::model::graph::Graph;
use crate::model::node::{Node, Status};
use crate::model::tags::TagVocabulary;

/// Checks whether `node` may move to `next`.
///
/// `node` must carry the edge set that will be persisted, which may differ
/// from the loaded copy in `graph`.
///
/// # Errors
/// - `BedrockStatus` for any explicit change on a bedrock node.
/// - `MissingReduction` when promoting a node without parents.
/// - `NotFound` when a direct parent is missing from `graph`, e.g. deleted
///   after the edge was written.
/// - `UnvalidatedParent` when a direct parent is tentative.
pub fn check_status_change(graph: &Graph, node: &Node, next: Status) -> GraphResult<()> {
    if node.is_bedrock() {
        return Err(GraphError::BedrockStatus(node.slug.clone()));
    }
    if next == Status::Tentative {
        return Ok(());
    }
    if node.reduces_to.is_empty() {
        return Err(GraphError::MissingReduction(node.slug.clone()));
    }

    let mut tentative: Vec<String> = Vec::new();
    for slug in &node.reduces_to {
        let parent = graph
            .get(slug)
            .ok_or_else(|| GraphError::NotFound(slug.clone()))?;
        if !parent.is_validated() {
            tentative.push(parent.slug.clone());
        }
    }
    if !tentative.is_empty() {
        return Err(GraphError::UnvalidatedParent {
            slug: node.slug.clone(),
            tentative,
        });
    }
    Ok(())
}

/// Checks delete eligibility against the freshly derived reverse index.
///
/// # Errors
/// - `DeleteBlocked` when the node is validated and has dependents.
pub fn check_delete(graph: &Graph, node: &Node) -> GraphResult<()> {
    if !node.is_validated() {
        return Ok(());
    }
    let dependents = graph
        .reverse_index()
        .remove(&node.slug)
        .unwrap_or_default();
    if dependents.is_empty() {
        return Ok(());
    }
    Err(GraphError::DeleteBlocked {
        slug: node.slug.clone(),
        dependents,
    })
}

/// Checks tags against the injected vocabulary.
///
/// # Errors
/// - `RogueTag` naming the first tag outside the vocabulary.
pub fn check_tags<'a>(
    vocabulary: &dyn TagVocabulary,
    slug: Option<&str>,
    tags: impl IntoIterator<Item = &'a String>,
) -> GraphResult<()> {
    for tag in tags {
        if !vocabulary.contains(tag) {
            return Err(GraphError::RogueTag {
                slug: slug.map(str::to_string),
                tag: tag.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::Level;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    fn node(slug: &str, level: Level, parents: &[&str], status: Status) -> Node {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut node = Node::with_slug(slug, slug, level, "", created);
        node.reduces_to = parents.iter().map(|p| p.to_string()).collect();
        node.set_status(status);
        node
    }

    #[test]
    fn promotion_needs_validated_direct_parents() {
        let graph = Graph::from_nodes([
            node("p", Level::Percept, &[], Status::Tentative),
            node("r", Level::Rule, &["p"], Status::Tentative),
            node("d", Level::Deduction, &["r"], Status::Tentative),
        ]);
        let rule = graph.get("r").unwrap();
        check_status_change(&graph, rule, Status::Validated).unwrap();

        let deduction = graph.get("d").unwrap();
        let err = check_status_change(&graph, deduction, Status::Validated).unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnvalidatedParent { ref tentative, .. } if tentative == &vec!["r".to_string()]
        ));
        check_status_change(&graph, deduction, Status::Tentative).unwrap();
    }

    #[test]
    fn promotion_over_missing_parent_is_not_found() {
        let graph = Graph::from_nodes([
            node("p", Level::Percept, &[], Status::Validated),
            node("d", Level::Deduction, &["p", "gone"], Status::Tentative),
        ]);
        let err = check_status_change(&graph, graph.get("d").unwrap(), Status::Validated)
            .unwrap_err();
        assert!(matches!(err, GraphError::NotFound(ref slug) if slug == "gone"));
        check_status_change(&graph, graph.get("d").unwrap(), Status::Tentative).unwrap();
    }

    #[test]
    fn bedrock_status_is_not_settable() {
        let axiom = node("a", Level::Axiom, &[], Status::Validated);
        let graph = Graph::from_nodes([axiom.clone()]);
        let err = check_status_change(&graph, &axiom, Status::Validated).unwrap_err();
        assert!(matches!(err, GraphError::BedrockStatus(_)));
    }

    #[test]
    fn promotion_without_parents_is_missing_reduction() {
        let rule = node("r", Level::Rule, &[], Status::Tentative);
        let graph = Graph::from_nodes([rule.clone()]);
        let err = check_status_change(&graph, &rule, Status::Validated).unwrap_err();
        assert!(matches!(err, GraphError::MissingReduction(_)));
    }

    #[test]
    fn delete_blocked_only_for_validated_with_dependents() {
        let graph = Graph::from_nodes([
            node("p", Level::Percept, &[], Status::Validated),
            node("r", Level::Rule, &["p"], Status::Tentative),
            node("lonely", Level::Rule, &["p"], Status::Validated),
        ]);
        let err = check_delete(&graph, graph.get("p").unwrap()).unwrap_err();
        assert!(matches!(
            err,
            GraphError::DeleteBlocked { ref dependents, .. } if dependents.len() == 2
        ));
        check_delete(&graph, graph.get("r").unwrap()).unwrap();
        check_delete(&graph, graph.get("lonely").unwrap()).unwrap();
    }

    #[test]
    fn rogue_tags_name_the_offender() {
        let vocabulary: BTreeSet<String> = ["ethics".to_string()].into_iter().collect();
        let tags = vec!["ethics".to_string(), "astrology".to_string()];
        let err = check_tags(&vocabulary, Some("r"), &tags).unwrap_err();
        assert!(matches!(err, GraphError::RogueTag { ref tag, .. } if tag == "astrology"));
    }
}
