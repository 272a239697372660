//! Reduction edge validator.
//!
//! # Responsibility
//! - Check proposed `reduces_to` edges against existence, rank ordering and
//!   cycle-freedom before anything is persisted.
//!
//! # Invariants
//! - Checks run per target in order: existence, self-edge, rank, reachability.
//! - All-or-nothing: the first failing target aborts the whole batch and the
//!   caller commits no edge.
//!
//! # See also
//! - service/integrity.rs for the after-the-fact full-graph audit.

use crate::error::{GraphError, GraphResult};
use crate::model::graph::Graph;
use crate::model::node::Level;

/// Validates every edge `source -> target` for `targets`.
///
/// `source` may be absent from `graph` (a node being created).
///
/// # Errors
/// - `NotFound` when a target is not loaded.
/// - `CycleDetected` for a self-edge or when the target already reaches
///   `source`.
/// - `LevelMismatch` when `rank(source) > rank(target)` does not hold; this
///   also rejects edges between the two bedrock levels.
pub fn validate_reductions(
    graph: &Graph,
    source: &str,
    source_level: Level,
    targets: &[String],
) -> GraphResult<()> {
    for target in targets {
        validate_reduction(graph, source, source_level, target)?;
    }
    Ok(())
}

/// Validates one edge. See [`validate_reductions`].
pub fn validate_reduction(
    graph: &Graph,
    source: &str,
    source_level: Level,
    target: &str,
) -> GraphResult<()> {
    let target_node = graph
        .get(target)
        .ok_or_else(|| GraphError::NotFound(target.to_string()))?;

    if target == source {
        return Err(GraphError::CycleDetected {
            source: source.to_string(),
            target: target.to_string(),
        });
    }

    if source_level.rank() <= target_node.level.rank() {
        return Err(GraphError::LevelMismatch {
            source: source.to_string(),
            source_level,
            target: target.to_string(),
            target_level: target_node.level,
        });
    }

    if graph.reaches(target, source) {
        return Err(GraphError::CycleDetected {
            source: source.to_string(),
            target: target.to_string(),
        });
    }

    Ok(())
}
