//! Core use-case services.
//!
//! # Responsibility
//! - Enforce reduction, status and delete rules above the repository layer.
//! - Orchestrate loads, checks and writes into use-case level APIs.
//!
//! # See also
//! - repo/node_repo.rs for the persistence contract.

pub mod chain;
pub mod consolidation;
pub mod integrity;
pub mod node_service;
pub mod rules;
pub mod validator;
