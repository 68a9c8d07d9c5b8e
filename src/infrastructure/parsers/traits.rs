//! Traits for ecosystem adapters and the package-manager processes they drive

use crate::application::errors::{ApplicationError, ManifestError, ParseError};
use crate::config::ToolsConfig;
use crate::domain::{DependencyNode, Ecosystem};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Captured result of a finished package-manager process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Most useful diagnostic text the tool produced
    pub fn diagnostics(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let lines: Vec<&str> = text.lines().rev().take(20).collect();
        lines.into_iter().rev().collect::<Vec<_>>().join("\n")
    }
}

/// Runs external tools. Replaced by an in-memory runner in tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        working_dir: &Path,
    ) -> Result<CommandOutput, ManifestError>;
}

/// Spawns real processes with `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        working_dir: &Path,
    ) -> Result<CommandOutput, ManifestError> {
        debug!(program, ?args, dir = %working_dir.display(), "Running package manager");

        let output = tokio::process::Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ManifestError::ToolUnavailable {
                    tool: program.to_string(),
                },
                _ => ManifestError::ToolFailed {
                    tool: program.to_string(),
                    message: e.to_string(),
                },
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Builds a dependency tree for one ecosystem from its manifest
#[async_trait]
pub trait EcosystemAdapter: Send + Sync {
    /// Get the ecosystem this adapter handles
    fn ecosystem(&self) -> Ecosystem;

    /// Parse the package manager's machine-readable tree output
    fn parse_tree(&self, output: &str) -> Result<DependencyNode, ParseError>;

    /// Run the package manager against `manifest_path` and parse its tree
    async fn build(&self, manifest_path: &Path) -> Result<DependencyNode, ApplicationError>;
}

/// Resolve a manifest path and the directory the tool must run in
pub(crate) async fn locate_manifest(
    manifest_path: &Path,
) -> Result<(PathBuf, PathBuf), ManifestError> {
    let not_found = || ManifestError::ManifestNotFound {
        path: manifest_path.display().to_string(),
    };

    let metadata = tokio::fs::metadata(manifest_path)
        .await
        .map_err(|_| not_found())?;
    if !metadata.is_file() {
        return Err(not_found());
    }

    let manifest = tokio::fs::canonicalize(manifest_path)
        .await
        .map_err(|_| not_found())?;
    let dir = manifest
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(not_found)?;
    Ok((manifest, dir))
}

/// Factory for creating the adapter of an ecosystem
pub struct AdapterFactory {
    tools: ToolsConfig,
    runner: Arc<dyn CommandRunner>,
}

impl AdapterFactory {
    pub fn new(tools: ToolsConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { tools, runner }
    }

    /// Factory backed by real processes
    pub fn system(tools: ToolsConfig) -> Self {
        Self::new(tools, Arc::new(SystemCommandRunner))
    }

    pub fn create_adapter(&self, ecosystem: Ecosystem) -> Box<dyn EcosystemAdapter> {
        match ecosystem {
            Ecosystem::Maven => Box::new(super::maven::MavenAdapter::new(
                self.tools.clone(),
                self.runner.clone(),
            )),
            Ecosystem::Npm => Box::new(super::npm::NpmAdapter::new(
                self.tools.clone(),
                self.runner.clone(),
            )),
        }
    }

    /// Detect ecosystem from the manifest filename
    pub fn detect_ecosystem(manifest_path: &Path) -> Option<Ecosystem> {
        let filename = manifest_path.file_name()?.to_str()?;
        Ecosystem::all()
            .into_iter()
            .find(|ecosystem| ecosystem.manifest_file() == filename)
    }
}
