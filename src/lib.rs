//! Vultra - dependency vulnerability resolution
//!
//! Builds the dependency tree of a Maven or npm project, flattens it and
//! resolves every dependency against the GitHub Security Advisory and NVD
//! feeds, producing a report of vulnerable dependencies and their paths.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;

pub use application::{ResolutionPipeline, render_json, render_text};
pub use config::Config;
pub use logging::init_tracing;
