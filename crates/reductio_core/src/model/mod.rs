//! Domain model for the reduction graph.
//!
//! # Responsibility
//! - Define canonical node, rank and status types.
//! - Hold the slug-keyed node set loaded for one invocation.
//! - Define the injected tag vocabulary seam.
//!
//! # Invariants
//! - Every node is identified by a time-ordered slug.
//! - The reverse-edge index is derived on demand and never persisted.

pub mod graph;
pub mod node;
pub mod tags;
