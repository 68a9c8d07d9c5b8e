//! npm ecosystem adapter

use super::traits::{CommandRunner, EcosystemAdapter, locate_manifest};
use crate::application::errors::{ApplicationError, ManifestError, ParseError};
use crate::config::ToolsConfig;
use crate::domain::{DependencyNode, Ecosystem, UNKNOWN_VERSION};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One node of `npm list --all --json`. Children are keyed by package name.
#[derive(Debug, Deserialize)]
struct NpmTreeNode {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, NpmTreeNode>,
}

impl NpmTreeNode {
    fn into_node(self, fallback_name: &str) -> DependencyNode {
        let name = self.name.unwrap_or_else(|| fallback_name.to_string());
        let version = self
            .version
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        let children = self
            .dependencies
            .into_iter()
            .map(|(child_name, child)| child.into_node(&child_name))
            .collect();
        DependencyNode::new(name, version).with_children(children)
    }
}

/// Resolves a `package.json` through the npm CLI
pub struct NpmAdapter {
    tools: ToolsConfig,
    runner: Arc<dyn CommandRunner>,
}

impl NpmAdapter {
    pub fn new(tools: ToolsConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { tools, runner }
    }

    fn args(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }
}

#[async_trait]
impl EcosystemAdapter for NpmAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn parse_tree(&self, output: &str) -> Result<DependencyNode, ParseError> {
        let root: NpmTreeNode = serde_json::from_str(output)?;
        Ok(root.into_node(UNKNOWN_VERSION))
    }

    async fn build(&self, manifest_path: &Path) -> Result<DependencyNode, ApplicationError> {
        let (manifest, project_dir) = locate_manifest(manifest_path).await?;
        let tool = self.tools.npm_command.as_str();

        if self.tools.npm_install_first {
            info!(dir = %project_dir.display(), "Installing npm dependencies");
            let install = self
                .runner
                .run(
                    tool,
                    &Self::args(&["install", "--ignore-scripts", "--no-audit", "--no-fund"]),
                    &project_dir,
                )
                .await?;
            if !install.success {
                return Err(ManifestError::ToolFailed {
                    tool: tool.to_string(),
                    message: install.diagnostics(),
                }
                .into());
            }
        }

        info!(manifest = %manifest.display(), "Resolving npm dependency tree");
        let listing = self
            .runner
            .run(tool, &Self::args(&["list", "--all", "--json"]), &project_dir)
            .await?;

        // npm list exits non-zero on missing or extraneous packages but still prints the tree
        if listing.stdout.trim().is_empty() {
            return Err(ManifestError::ToolFailed {
                tool: tool.to_string(),
                message: listing.diagnostics(),
            }
            .into());
        }
        if !listing.success {
            warn!(
                status = ?listing.status_code,
                "npm list reported problems, using the tree it printed"
            );
        }

        let root = self
            .parse_tree(&listing.stdout)
            .map_err(|e| ManifestError::ManifestUnparseable {
                path: manifest.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(root = %root.name, direct = root.children.len(), "Parsed npm tree");
        Ok(root)
    }
}
