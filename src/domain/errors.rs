//! Domain-specific error types

use thiserror::Error;

/// Domain-level errors for dependency resolution
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid ecosystem: {ecosystem}")]
    InvalidEcosystem { ecosystem: String },
}
