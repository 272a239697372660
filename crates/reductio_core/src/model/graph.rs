//! In-memory node set for one invocation.
//!
//! # Responsibility
//! - Hold every loaded node keyed by slug.
//! - Answer reachability, ancestry and dependent queries over `reduces_to`.
//! - Resolve fuzzy node references for callers.
//!
//! # Invariants
//! - Iteration order is slug order, which is creation order.
//! - Edges to absent slugs are kept as loaded; traversals skip them.
//! - The reverse index is recomputed from the full node set on every call.

use crate::error::GraphError;
use crate::model::node::{Node, Slug};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Slug-keyed node map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    nodes: BTreeMap<Slug, Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph; a later node with an already-seen slug replaces the
    /// earlier one.
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let mut graph = Self::new();
        for node in nodes {
            graph.insert(node);
        }
        graph
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.nodes.contains_key(slug)
    }

    pub fn get(&self, slug: &str) -> Option<&Node> {
        self.nodes.get(slug)
    }

    pub fn get_mut(&mut self, slug: &str) -> Option<&mut Node> {
        self.nodes.get_mut(slug)
    }

    pub fn insert(&mut self, node: Node) -> Option<Node> {
        self.nodes.insert(node.slug.clone(), node)
    }

    pub fn remove(&mut self, slug: &str) -> Option<Node> {
        self.nodes.remove(slug)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Parents of `slug` that exist in this graph, in edge order.
    pub fn parents_of<'a>(&'a self, slug: &str) -> impl Iterator<Item = &'a Node> + 'a {
        let edges: &'a [Slug] = self
            .nodes
            .get(slug)
            .map(|node| node.reduces_to.as_slice())
            .unwrap_or(&[]);
        edges.iter().filter_map(move |target| self.nodes.get(target))
    }

    /// Derived reverse-edge index: target slug -> dependent slugs.
    ///
    /// Only edges whose source and target both exist are indexed. Dependents
    /// are listed in slug order without duplicates.
    pub fn reverse_index(&self) -> BTreeMap<Slug, Vec<Slug>> {
        let mut index: BTreeMap<Slug, Vec<Slug>> = BTreeMap::new();
        for node in self.nodes.values() {
            for target in &node.reduces_to {
                if !self.nodes.contains_key(target) {
                    continue;
                }
                let dependents = index.entry(target.clone()).or_default();
                if !dependents.contains(&node.slug) {
                    dependents.push(node.slug.clone());
                }
            }
        }
        index
    }

    /// Nodes whose `reduces_to` names `slug`.
    pub fn dependents_of(&self, slug: &str) -> Vec<Slug> {
        self.nodes
            .values()
            .filter(|node| node.reduces_to.iter().any(|target| target == slug))
            .map(|node| node.slug.clone())
            .collect()
    }

    /// Whether `to` is reachable from `from` by following `reduces_to`.
    ///
    /// A node always reaches itself. Tolerates cycles in corrupt data.
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![from];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for target in &node.reduces_to {
                if target == to {
                    return true;
                }
                if !visited.contains(target.as_str()) {
                    stack.push(target.as_str());
                }
            }
        }
        false
    }

    /// Every existing node reachable from `slug` via `reduces_to`, excluding
    /// `slug` itself, in breadth-first order.
    pub fn ancestors(&self, slug: &str) -> Vec<&Node> {
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(slug);
        let mut queue: VecDeque<&str> = VecDeque::from([slug]);
        let mut found = Vec::new();
        while let Some(current) = queue.pop_front() {
            for parent in self.parents_of(current) {
                if visited.insert(parent.slug.as_str()) {
                    found.push(parent);
                    queue.push_back(parent.slug.as_str());
                }
            }
        }
        found
    }

    /// Resolves a possibly partial node reference.
    ///
    /// Lookup order: exact slug, then a unique case-insensitive slug
    /// substring.
    ///
    /// # Errors
    /// - `NotFound` when nothing matches.
    /// - `AmbiguousMatch` when more than one slug contains the query.
    pub fn resolve(&self, query: &str) -> Result<&Node, GraphError> {
        let query = query.trim();
        if let Some(node) = self.nodes.get(query) {
            return Ok(node);
        }
        if query.is_empty() {
            return Err(GraphError::NotFound(query.to_string()));
        }

        let needle = query.to_lowercase();
        let candidates: Vec<&Node> = self
            .nodes
            .values()
            .filter(|node| node.slug.to_lowercase().contains(&needle))
            .collect();
        match candidates.as_slice() {
            [] => Err(GraphError::NotFound(query.to_string())),
            [single] => Ok(*single),
            many => Err(GraphError::AmbiguousMatch {
                query: query.to_string(),
                candidates: many.iter().map(|node| node.slug.clone()).collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::Level;
    use chrono::{TimeZone, Utc};

    fn node(slug: &str, level: Level, parents: &[&str]) -> Node {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut node = Node::with_slug(slug, slug, level, "", created);
        node.reduces_to = parents.iter().map(|p| p.to_string()).collect();
        node
    }

    fn sample() -> Graph {
        Graph::from_nodes([
            node("p", Level::Percept, &[]),
            node("a", Level::Axiom, &[]),
            node("r", Level::Rule, &["p", "a"]),
            node("d", Level::Deduction, &["r", "ghost"]),
        ])
    }

    #[test]
    fn reverse_index_skips_missing_targets() {
        let index = sample().reverse_index();
        assert_eq!(index["p"], vec!["r".to_string()]);
        assert_eq!(index["r"], vec!["d".to_string()]);
        assert!(!index.contains_key("ghost"));
    }

    #[test]
    fn reaches_follows_transitive_edges() {
        let graph = sample();
        assert!(graph.reaches("d", "p"));
        assert!(graph.reaches("r", "r"));
        assert!(!graph.reaches("p", "d"));
    }

    #[test]
    fn reaches_terminates_on_cycles() {
        let graph = Graph::from_nodes([
            node("x", Level::Rule, &["y"]),
            node("y", Level::Rule, &["x"]),
        ]);
        assert!(graph.reaches("x", "y"));
        assert!(!graph.reaches("x", "z"));
    }

    #[test]
    fn ancestors_are_unique_and_exclude_self() {
        let graph = sample();
        let slugs: Vec<&str> = graph
            .ancestors("d")
            .into_iter()
            .map(|node| node.slug.as_str())
            .collect();
        assert_eq!(slugs, vec!["r", "p", "a"]);
    }

    #[test]
    fn resolve_prefers_exact_then_unique_substring() {
        let graph = Graph::from_nodes([
            node("20260101-fire-burns", Level::Rule, &[]),
            node("20260102-fire-warms", Level::Rule, &[]),
            node("20260103-water-flows", Level::Rule, &[]),
        ]);
        assert_eq!(
            graph.resolve("WATER").unwrap().slug,
            "20260103-water-flows"
        );
        let err = graph.resolve("fire").unwrap_err();
        assert!(matches!(err, GraphError::AmbiguousMatch { ref candidates, .. } if candidates.len() == 2));
        assert!(matches!(graph.resolve("ice"), Err(GraphError::NotFound(_))));
    }
}
