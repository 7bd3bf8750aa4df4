//! Error types for the world engine
//!
//! ## Table of Contents
//! 1. WorldError - Main error enum

use thiserror::Error;

/// Errors that can occur in world-graph, view and route operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorldError {
    /// Id or name does not resolve
    #[error("Not found: {0}")]
    NotFound(String),

    /// Offset chain does not terminate in an absolute location
    #[error("Unresolvable position for {0}")]
    Unresolvable(String),

    /// Parent assignment would make a region its own ancestor
    #[error("Cycle: {0} cannot be placed under {1}")]
    Cycle(String, String),

    /// Operation refused because it would break the graph
    #[error("Blocked: {0}")]
    Blocked(String),

    /// Malformed route data
    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    /// Rejected input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type for world operations
pub type Result<T> = std::result::Result<T, WorldError>;
