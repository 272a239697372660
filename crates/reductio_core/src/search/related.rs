//! Structural connectivity search.
//!
//! # Responsibility
//! - Resolve a free-form query into one or more seed nodes.
//! - Expand a bounded-radius neighborhood around every seed in both edge
//!   directions and score what it reaches.
//!
//! # Invariants
//! - Relatedness is purely structural; proposition text is never compared.
//! - Seeds are never reported as hits.
//! - Sorting is stable, so equal scores keep first-encounter order.
//!
//! # See also
//! - model/graph.rs for the reverse index used by "up" steps.

use crate::error::{GraphError, GraphResult};
use crate::model::graph::Graph;
use crate::model::node::{Level, Slug, Status};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

const REACH_WEIGHT: f64 = 2.0;
const VALIDATED_BONUS: f64 = 0.5;
const DEDUCTION_BONUS: f64 = 0.3;
const RULE_BONUS: f64 = 0.2;

/// How the query was turned into seeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedKind {
    Slug,
    Tag,
    Title,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPoint {
    pub kind: SeedKind,
    pub seeds: Vec<Slug>,
}

/// Direction shape of a path from a seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Reached by following `reduces_to` only.
    Ancestor,
    /// Reached by following reverse edges only.
    Dependent,
    /// Down toward shared grounds, then up to another dependent.
    Sibling,
    /// Any other mix of directions.
    Related,
}

#[derive(Debug, Clone)]
pub struct RelatedQuery {
    pub query: String,
    pub max_hops: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedHit {
    pub slug: Slug,
    pub title: String,
    pub level: Level,
    pub status: Status,
    pub min_distance: usize,
    /// Distinct seeds that reach this node within the hop bound.
    pub reach_count: usize,
    pub relations: Vec<Relation>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedResult {
    pub query: String,
    /// `None` for a blank query.
    pub entry: Option<EntryPoint>,
    pub hits: Vec<RelatedHit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Step {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Shape {
    Origin,
    Down,
    Up,
    DownUp,
    Mixed,
}

impl Shape {
    fn then(self, step: Step) -> Self {
        match (self, step) {
            (Self::Origin, Step::Down) | (Self::Down, Step::Down) => Self::Down,
            (Self::Origin, Step::Up) | (Self::Up, Step::Up) => Self::Up,
            (Self::Down, Step::Up) | (Self::DownUp, Step::Up) => Self::DownUp,
            _ => Self::Mixed,
        }
    }

    fn relation(self) -> Option<Relation> {
        match self {
            Self::Origin => None,
            Self::Down => Some(Relation::Ancestor),
            Self::Up => Some(Relation::Dependent),
            Self::DownUp => Some(Relation::Sibling),
            Self::Mixed => Some(Relation::Related),
        }
    }
}

struct Discovery {
    min_distance: usize,
    seeds: BTreeSet<usize>,
    relations: BTreeSet<Relation>,
}

/// Resolves the query into seeds.
///
/// Order: slug (exact, then unique substring), exact tag (case-insensitive,
/// every tagged node), title substring (case-insensitive). The first stage
/// that yields nodes wins.
///
/// # Errors
/// - `AmbiguousMatch` when the slug stage was ambiguous and no later stage
///   matched.
/// - `NotFound` when nothing matched.
pub fn resolve_entry(graph: &Graph, query: &str) -> GraphResult<EntryPoint> {
    let query = query.trim();
    let ambiguity = match graph.resolve(query) {
        Ok(node) => {
            return Ok(EntryPoint {
                kind: SeedKind::Slug,
                seeds: vec![node.slug.clone()],
            })
        }
        Err(err @ GraphError::AmbiguousMatch { .. }) => Some(err),
        Err(_) => None,
    };

    let tagged: Vec<Slug> = graph
        .nodes()
        .filter(|node| node.tags.iter().any(|tag| tag.eq_ignore_ascii_case(query)))
        .map(|node| node.slug.clone())
        .collect();
    if !tagged.is_empty() {
        return Ok(EntryPoint {
            kind: SeedKind::Tag,
            seeds: tagged,
        });
    }

    let needle = query.to_lowercase();
    let titled: Vec<Slug> = graph
        .nodes()
        .filter(|node| node.title.to_lowercase().contains(&needle))
        .map(|node| node.slug.clone())
        .collect();
    if !titled.is_empty() {
        return Ok(EntryPoint {
            kind: SeedKind::Title,
            seeds: titled,
        });
    }

    Err(ambiguity.unwrap_or_else(|| GraphError::NotFound(query.to_string())))
}

/// Runs the connectivity search.
pub fn find_related(graph: &Graph, request: &RelatedQuery) -> GraphResult<RelatedResult> {
    if request.query.trim().is_empty() {
        return Ok(RelatedResult {
            query: request.query.clone(),
            entry: None,
            hits: Vec::new(),
        });
    }

    let entry = resolve_entry(graph, &request.query)?;
    let reverse = graph.reverse_index();
    let seed_set: HashSet<&str> = entry.seeds.iter().map(String::as_str).collect();

    let mut order: Vec<&str> = Vec::new();
    let mut found: HashMap<&str, Discovery> = HashMap::new();

    for (seed_index, seed) in entry.seeds.iter().enumerate() {
        let mut visited: HashSet<(&str, Shape)> = HashSet::new();
        visited.insert((seed.as_str(), Shape::Origin));
        let mut queue: VecDeque<(&str, Shape, usize)> =
            VecDeque::from([(seed.as_str(), Shape::Origin, 0)]);

        while let Some((current, shape, distance)) = queue.pop_front() {
            if distance >= request.max_hops {
                continue;
            }
            let down = graph
                .parents_of(current)
                .map(|parent| (Step::Down, parent.slug.as_str()));
            let up = reverse
                .get(current)
                .into_iter()
                .flatten()
                .map(|dependent| (Step::Up, dependent.as_str()));
            let neighbors: Vec<(Step, &str)> = down.chain(up).collect();

            for (step, neighbor) in neighbors {
                let next_shape = shape.then(step);
                if !visited.insert((neighbor, next_shape)) {
                    continue;
                }
                let next_distance = distance + 1;
                queue.push_back((neighbor, next_shape, next_distance));
                if seed_set.contains(neighbor) {
                    continue;
                }

                let discovery = found.entry(neighbor).or_insert_with(|| {
                    order.push(neighbor);
                    Discovery {
                        min_distance: next_distance,
                        seeds: BTreeSet::new(),
                        relations: BTreeSet::new(),
                    }
                });
                discovery.min_distance = discovery.min_distance.min(next_distance);
                discovery.seeds.insert(seed_index);
                if let Some(relation) = next_shape.relation() {
                    discovery.relations.insert(relation);
                }
            }
        }
    }

    let mut hits: Vec<RelatedHit> = order
        .into_iter()
        .filter_map(|slug| {
            let node = graph.get(slug)?;
            let discovery = found.get(slug)?;
            Some(RelatedHit {
                slug: node.slug.clone(),
                title: node.title.clone(),
                level: node.level,
                status: node.status(),
                min_distance: discovery.min_distance,
                reach_count: discovery.seeds.len(),
                relations: discovery.relations.iter().copied().collect(),
                score: score(
                    discovery.seeds.len(),
                    discovery.min_distance,
                    node.is_validated(),
                    node.level,
                ),
            })
        })
        .collect();
    hits.sort_by(|left, right| right.score.total_cmp(&left.score));
    hits.truncate(request.limit);

    Ok(RelatedResult {
        query: request.query.clone(),
        entry: Some(entry),
        hits,
    })
}

/// `reach_count * 2 + 1 / min_distance`, plus status and actionability
/// bonuses.
pub fn score(reach_count: usize, min_distance: usize, validated: bool, level: Level) -> f64 {
    let mut score = reach_count as f64 * REACH_WEIGHT + 1.0 / min_distance.max(1) as f64;
    if validated {
        score += VALIDATED_BONUS;
    }
    score += match level {
        Level::Deduction => DEDUCTION_BONUS,
        Level::Rule => RULE_BONUS,
        Level::Axiom | Level::Percept => 0.0,
    };
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::Node;
    use chrono::{TimeZone, Utc};

    fn node(slug: &str, level: Level, parents: &[&str]) -> Node {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut node = Node::with_slug(slug, slug, level, "", created);
        node.reduces_to = parents.iter().map(|p| p.to_string()).collect();
        node
    }

    fn query(text: &str, max_hops: usize) -> RelatedQuery {
        RelatedQuery {
            query: text.to_string(),
            max_hops,
            limit: 10,
        }
    }

    fn hit<'a>(result: &'a RelatedResult, slug: &str) -> &'a RelatedHit {
        result.hits.iter().find(|hit| hit.slug == slug).unwrap()
    }

    #[test]
    fn labels_follow_path_shape() {
        let graph = Graph::from_nodes([
            node("p", Level::Percept, &[]),
            node("r1", Level::Rule, &["p"]),
            node("r2", Level::Rule, &["p"]),
            node("d", Level::Deduction, &["r1"]),
        ]);
        let result = find_related(&graph, &query("r1", 2)).unwrap();
        assert_eq!(result.entry.as_ref().unwrap().kind, SeedKind::Slug);
        assert_eq!(hit(&result, "p").relations, vec![Relation::Ancestor]);
        assert_eq!(hit(&result, "d").relations, vec![Relation::Dependent]);
        assert_eq!(hit(&result, "r2").relations, vec![Relation::Sibling]);
        assert_eq!(hit(&result, "r2").min_distance, 2);
        assert!(result.hits.iter().all(|hit| hit.slug != "r1"));
    }

    #[test]
    fn hop_bound_limits_radius() {
        let graph = Graph::from_nodes([
            node("p", Level::Percept, &[]),
            node("r", Level::Rule, &["p"]),
            node("d", Level::Deduction, &["r"]),
        ]);
        let result = find_related(&graph, &query("d", 1)).unwrap();
        let slugs: Vec<&str> = result.hits.iter().map(|hit| hit.slug.as_str()).collect();
        assert_eq!(slugs, vec!["r"]);
    }

    #[test]
    fn shared_neighbor_of_two_seeds_outranks_single_reach() {
        let mut left = node("left", Level::Rule, &["p-shared", "p-left"]);
        left.tags = vec!["ethics".to_string()];
        let mut right = node("right", Level::Rule, &["p-shared", "p-right"]);
        right.tags = vec!["Ethics".to_string()];
        let graph = Graph::from_nodes([
            node("p-shared", Level::Percept, &[]),
            node("p-left", Level::Percept, &[]),
            node("p-right", Level::Percept, &[]),
            left,
            right,
        ]);
        let result = find_related(&graph, &query("ethics", 1)).unwrap();
        let entry = result.entry.as_ref().unwrap();
        assert_eq!(entry.kind, SeedKind::Tag);
        assert_eq!(entry.seeds.len(), 2);

        let shared = hit(&result, "p-shared");
        let single = hit(&result, "p-left");
        assert_eq!(shared.reach_count, 2);
        assert_eq!(single.reach_count, 1);
        assert!(shared.score > single.score);
        assert_eq!(result.hits[0].slug, "p-shared");
        // Equal scores keep encounter order.
        assert_eq!(result.hits[1].slug, "p-left");
        assert_eq!(result.hits[2].slug, "p-right");
    }

    #[test]
    fn title_entry_and_limit() {
        let mut titled = node("t1", Level::Rule, &["p"]);
        titled.title = "Heat Transfers".to_string();
        let graph = Graph::from_nodes([
            node("p", Level::Percept, &[]),
            node("q", Level::Percept, &[]),
            titled,
            node("d", Level::Deduction, &["t1", "q"]),
        ]);
        let mut request = query("heat", 3);
        request.limit = 1;
        let result = find_related(&graph, &request).unwrap();
        assert_eq!(result.entry.as_ref().unwrap().kind, SeedKind::Title);
        assert_eq!(result.hits.len(), 1);
    }

    #[test]
    fn blank_query_is_empty_and_unknown_query_is_not_found() {
        let graph = Graph::from_nodes([node("p", Level::Percept, &[])]);
        let result = find_related(&graph, &query("  ", 3)).unwrap();
        assert!(result.entry.is_none());
        assert!(result.hits.is_empty());
        assert!(matches!(
            find_related(&graph, &query("zebra", 3)),
            Err(GraphError::NotFound(_))
        ));
    }

    #[test]
    fn score_weights() {
        let base = score(1, 1, false, Level::Percept);
        assert!((base - 3.0).abs() < f64::EPSILON);
        let rich = score(1, 2, true, Level::Deduction);
        assert!((rich - (2.0 + 0.5 + 0.5 + 0.3)).abs() < 1e-9);
    }
}
