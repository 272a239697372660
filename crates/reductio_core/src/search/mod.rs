//! Search entry points.
//!
//! # Responsibility
//! - Expose structural connectivity search over the loaded graph.
//! - Keep result shaping and scoring inside core.

pub mod related;
