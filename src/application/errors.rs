//! Application layer error types

use crate::domain::DomainError;
use serde_json::json;
use thiserror::Error;

/// Application-level errors
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Parsing error: {0}")]
    Parse(#[from] ParseError),

    #[error("Vulnerability lookup error: {0}")]
    Vulnerability(#[from] VulnerabilityError),

    #[error("No dependencies found for {root}")]
    NoDependencies { root: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures obtaining a dependency tree from a manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest not found: {path}")]
    ManifestNotFound { path: String },

    #[error("Manifest {path} could not be resolved: {reason}")]
    ManifestUnparseable { path: String, reason: String },

    #[error("Required tool is not installed: {tool}")]
    ToolUnavailable { tool: String },

    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum VulnerabilityError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed response from {source_name}: {message}")]
    MalformedResponse {
        source_name: String,
        message: String,
    },

    #[error("Rate limit exceeded for {api}")]
    RateLimit { api: String },

    #[error("Timeout occurred after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Pagination for {package} exceeded {pages} pages")]
    PaginationOverrun { package: String, pages: usize },
}

impl VulnerabilityError {
    /// Fatal errors abort the whole run; everything else is recorded and skipped
    pub fn is_fatal(&self) -> bool {
        matches!(self, VulnerabilityError::PaginationOverrun { .. })
    }

    /// A failed request, with client-side timeouts kept apart from other network errors
    pub fn request(error: reqwest::Error, timeout_seconds: u64) -> Self {
        if error.is_timeout() {
            VulnerabilityError::Timeout {
                seconds: timeout_seconds,
            }
        } else {
            VulnerabilityError::Network(error)
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Authentication failed")]
    Authentication,
}

impl ApplicationError {
    /// Get the error type as a string for structured failure output
    pub fn error_type(&self) -> &'static str {
        match self {
            ApplicationError::Domain(_) => "domain_error",
            ApplicationError::Manifest(ManifestError::ManifestNotFound { .. }) => {
                "manifest_not_found"
            }
            ApplicationError::Manifest(ManifestError::ManifestUnparseable { .. }) => {
                "manifest_unparseable"
            }
            ApplicationError::Manifest(ManifestError::ToolUnavailable { .. }) => "tool_unavailable",
            ApplicationError::Manifest(ManifestError::ToolFailed { .. }) => "tool_failed",
            ApplicationError::Parse(_) => "parse_error",
            ApplicationError::Vulnerability(VulnerabilityError::PaginationOverrun { .. }) => {
                "pagination_overrun"
            }
            ApplicationError::Vulnerability(_) => "vulnerability_error",
            ApplicationError::NoDependencies { .. } => "no_dependencies",
            ApplicationError::Configuration { .. } => "configuration_error",
            ApplicationError::Io(_) => "io_error",
            ApplicationError::Json(_) => "json_error",
        }
    }

    /// Structured failure document handed back to the caller
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
            }
        })
    }
}
