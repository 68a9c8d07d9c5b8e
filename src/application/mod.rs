//! Application Layer - Use cases and application services
//!
//! Orchestrates resolution of a dependency tree against the advisory sources
//! and renders the resulting report.

pub mod errors;
pub mod report;
pub mod services;

#[cfg(test)]
mod tests;

pub use errors::*;
pub use report::{ReportDocument, TextReport, render_json, render_text};
pub use services::ResolutionPipeline;
