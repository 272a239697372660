//! Repository layer: node files on disk.
//!
//! # Responsibility
//! - Define the persistence contract used by services.
//! - Keep file layout and metadata encoding inside this boundary.
//!
//! # Invariants
//! - Reads normalize metadata into one canonical node shape.
//! - Repository APIs return semantic errors (`NotFound`, `DuplicateSlug`,
//!   `Malformed`) in addition to IO failures.

pub mod frontmatter;
pub mod node_repo;
