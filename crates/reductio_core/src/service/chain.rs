//! Proof-chain and hollow-chain analysis.
//!
//! # Responsibility
//! - Build the proof tree under one node.
//! - Find validated nodes resting on a tentative transitive foundation.
//!
//! # Invariants
//! - Chain building always terminates: a per-path visited list stops
//!   cycles and `max_depth` caps recursion.
//! - Shared ancestors are repeated once per path, never deduplicated.
//! - Bedrock nodes are leaves with zero children.

use crate::error::{GraphError, GraphResult};
use crate::model::graph::Graph;
use crate::model::node::{Level, Node, Slug, Status};
use serde::Serialize;

/// One position in a proof tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainLink {
    Node {
        slug: Slug,
        title: String,
        level: Level,
        status: Status,
        children: Vec<ChainLink>,
    },
    /// Edge target is not loaded.
    Broken { slug: Slug },
    /// Target already appears on the current path.
    Cycle { slug: Slug },
    /// Depth ceiling reached before this node could be expanded.
    DepthLimit { slug: Slug },
}

impl ChainLink {
    pub fn slug(&self) -> &str {
        match self {
            Self::Node { slug, .. }
            | Self::Broken { slug }
            | Self::Cycle { slug }
            | Self::DepthLimit { slug } => slug,
        }
    }

    pub fn children(&self) -> &[ChainLink] {
        match self {
            Self::Node { children, .. } => children,
            _ => &[],
        }
    }
}

/// Builds the proof tree rooted at `slug`.
///
/// # Errors
/// - `NotFound` when the root itself is not loaded.
pub fn build_chain(graph: &Graph, slug: &str, max_depth: usize) -> GraphResult<ChainLink> {
    let root = graph
        .get(slug)
        .ok_or_else(|| GraphError::NotFound(slug.to_string()))?;
    let mut path: Vec<&str> = Vec::new();
    Ok(expand(graph, root, 0, max_depth, &mut path))
}

fn expand<'a>(
    graph: &'a Graph,
    node: &'a Node,
    depth: usize,
    max_depth: usize,
    path: &mut Vec<&'a str>,
) -> ChainLink {
    let mut children = Vec::new();
    if !node.is_bedrock() {
        path.push(node.slug.as_str());
        for target in &node.reduces_to {
            let child = if path.contains(&target.as_str()) {
                ChainLink::Cycle {
                    slug: target.clone(),
                }
            } else if let Some(parent) = graph.get(target) {
                if depth + 1 >= max_depth {
                    ChainLink::DepthLimit {
                        slug: target.clone(),
                    }
                } else {
                    expand(graph, parent, depth + 1, max_depth, path)
                }
            } else {
                ChainLink::Broken {
                    slug: target.clone(),
                }
            };
            children.push(child);
        }
        path.pop();
    }

    ChainLink::Node {
        slug: node.slug.clone(),
        title: node.title.clone(),
        level: node.level,
        status: node.status(),
        children,
    }
}

/// Validated node whose ancestry contains tentative nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HollowChain {
    pub slug: Slug,
    pub title: String,
    pub level: Level,
    /// Tentative ancestors in breadth-first order.
    pub weak_links: Vec<Slug>,
}

/// Scans every validated non-bedrock node's full ancestor set.
///
/// The walk does not stop at validated ancestors: a validated parent resting
/// on a tentative grandparent still makes the node hollow.
pub fn find_hollow_chains(graph: &Graph) -> Vec<HollowChain> {
    graph
        .nodes()
        .filter(|node| !node.is_bedrock() && node.is_validated())
        .filter_map(|node| {
            let weak_links: Vec<Slug> = graph
                .ancestors(&node.slug)
                .into_iter()
                .filter(|ancestor| !ancestor.is_validated())
                .map(|ancestor| ancestor.slug.clone())
                .collect();
            if weak_links.is_empty() {
                None
            } else {
                Some(HollowChain {
                    slug: node.slug.clone(),
                    title: node.title.clone(),
                    level: node.level,
                    weak_links,
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn node(slug: &str, level: Level, parents: &[&str], status: Status) -> Node {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut node = Node::with_slug(slug, slug, level, "", created);
        node.reduces_to = parents.iter().map(|p| p.to_string()).collect();
        node.set_status(status);
        node
    }

    fn count(link: &ChainLink, slug: &str) -> usize {
        let own = usize::from(link.slug() == slug);
        own + link
            .children()
            .iter()
            .map(|child| count(child, slug))
            .sum::<usize>()
    }

    #[test]
    fn diamond_repeats_shared_ancestor_per_path() {
        let graph = Graph::from_nodes([
            node("p", Level::Percept, &[], Status::Validated),
            node("r1", Level::Rule, &["p"], Status::Validated),
            node("r2", Level::Rule, &["p"], Status::Validated),
            node("d", Level::Deduction, &["r1", "r2"], Status::Validated),
        ]);
        let chain = build_chain(&graph, "d", 100).unwrap();
        assert_eq!(count(&chain, "p"), 2);
    }

    #[test]
    fn missing_and_cyclic_targets_become_marked_leaves() {
        let graph = Graph::from_nodes([
            node("x", Level::Rule, &["y", "ghost"], Status::Tentative),
            node("y", Level::Rule, &["x"], Status::Tentative),
        ]);
        let chain = build_chain(&graph, "x", 100).unwrap();
        let children = chain.children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].children(), &[ChainLink::Cycle { slug: "x".into() }]);
        assert_eq!(children[1], ChainLink::Broken { slug: "ghost".into() });
    }

    #[test]
    fn depth_ceiling_bounds_the_walk() {
        let graph = Graph::from_nodes([
            node("p", Level::Percept, &[], Status::Validated),
            node("r", Level::Rule, &["p"], Status::Validated),
            node("d", Level::Deduction, &["r"], Status::Validated),
        ]);
        let chain = build_chain(&graph, "d", 1).unwrap();
        assert_eq!(chain.children(), &[ChainLink::DepthLimit { slug: "r".into() }]);
        assert!(matches!(
            build_chain(&graph, "nope", 10),
            Err(GraphError::NotFound(_))
        ));
    }

    #[test]
    fn bedrock_leaves_have_no_children() {
        // Corrupt data: a percept claiming a parent.
        let graph = Graph::from_nodes([
            node("a", Level::Axiom, &[], Status::Validated),
            node("p", Level::Percept, &["a"], Status::Validated),
            node("r", Level::Rule, &["p"], Status::Validated),
        ]);
        let chain = build_chain(&graph, "r", 100).unwrap();
        assert!(chain.children()[0].children().is_empty());
    }

    #[test]
    fn hollow_chain_walks_past_validated_ancestors() {
        let graph = Graph::from_nodes([
            node("p", Level::Percept, &[], Status::Validated),
            node("r1", Level::Rule, &["p"], Status::Tentative),
            node("r2", Level::Rule, &["r1"], Status::Validated),
            node("d", Level::Deduction, &["r2"], Status::Validated),
            node("d-tentative", Level::Deduction, &["r1"], Status::Tentative),
        ]);
        let hollow = find_hollow_chains(&graph);
        let slugs: Vec<&str> = hollow.iter().map(|chain| chain.slug.as_str()).collect();
        assert_eq!(slugs, vec!["d", "r2"]);
        assert_eq!(hollow[0].weak_links, vec!["r1".to_string()]);
    }
}
