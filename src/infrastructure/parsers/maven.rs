//! Maven ecosystem adapter

use super::traits::{CommandRunner, EcosystemAdapter, locate_manifest};
use crate::application::errors::{ApplicationError, ManifestError, ParseError};
use crate::config::ToolsConfig;
use crate::domain::{DependencyNode, Ecosystem, UNKNOWN_VERSION};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File the dependency plugin writes next to the pom
pub const TREE_OUTPUT_FILE: &str = "dep-tree.json";

/// One node of `dependency:tree -DoutputType=json`
#[derive(Debug, Deserialize)]
struct MavenTreeNode {
    #[serde(rename = "groupId")]
    group_id: Option<String>,
    #[serde(rename = "artifactId")]
    artifact_id: Option<String>,
    version: Option<String>,
    #[serde(default)]
    children: Vec<MavenTreeNode>,
}

impl MavenTreeNode {
    fn into_node(self) -> DependencyNode {
        let name = format!(
            "{}:{}",
            self.group_id.as_deref().unwrap_or(UNKNOWN_VERSION),
            self.artifact_id.as_deref().unwrap_or(UNKNOWN_VERSION)
        );
        let version = self
            .version
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        let children = self
            .children
            .into_iter()
            .map(MavenTreeNode::into_node)
            .collect();
        DependencyNode::new(name, version).with_children(children)
    }
}

/// Resolves a `pom.xml` through the Maven dependency plugin
pub struct MavenAdapter {
    tools: ToolsConfig,
    runner: Arc<dyn CommandRunner>,
}

impl MavenAdapter {
    pub fn new(tools: ToolsConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { tools, runner }
    }

    fn tree_args(&self, manifest: &Path) -> Vec<String> {
        vec![
            "-f".to_string(),
            manifest.display().to_string(),
            self.tools.maven_tree_goal.clone(),
            format!("-DoutputFile={}", TREE_OUTPUT_FILE),
            "-DoutputType=json".to_string(),
        ]
    }
}

#[async_trait]
impl EcosystemAdapter for MavenAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Maven
    }

    fn parse_tree(&self, output: &str) -> Result<DependencyNode, ParseError> {
        let root: MavenTreeNode = serde_json::from_str(output)?;
        Ok(root.into_node())
    }

    async fn build(&self, manifest_path: &Path) -> Result<DependencyNode, ApplicationError> {
        let (manifest, project_dir) = locate_manifest(manifest_path).await?;
        let tree_file = project_dir.join(TREE_OUTPUT_FILE);
        let tool = self.tools.mvn_command.as_str();

        info!(manifest = %manifest.display(), "Resolving Maven dependency tree");
        let output = self
            .runner
            .run(tool, &self.tree_args(&manifest), &project_dir)
            .await?;
        if !output.success {
            return Err(ManifestError::ToolFailed {
                tool: tool.to_string(),
                message: output.diagnostics(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(&tree_file).await.map_err(|e| {
            ManifestError::ManifestUnparseable {
                path: manifest.display().to_string(),
                reason: format!("{} was not created: {}", TREE_OUTPUT_FILE, e),
            }
        })?;
        if let Err(e) = tokio::fs::remove_file(&tree_file).await {
            warn!(file = %tree_file.display(), error = %e, "Failed to remove tree output");
        }

        let root = self
            .parse_tree(&content)
            .map_err(|e| ManifestError::ManifestUnparseable {
                path: manifest.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(root = %root.name, direct = root.children.len(), "Parsed Maven tree");
        Ok(root)
    }
}
