//! Ecosystem-agnostic dependency tree and its flattened form

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Separator used when rendering a dependency path
pub const PATH_SEPARATOR: &str = " -> ";

/// One node of a resolved dependency tree. The root is the project itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub name: String,
    pub version: String,
    pub children: Vec<DependencyNode>,
}

/// A unique `(name, version)` pair with its direct/transitive status
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlatDependency {
    pub name: String,
    pub version: String,
    pub is_direct: bool,
}

impl FlatDependency {
    pub fn new(name: impl Into<String>, version: impl Into<String>, is_direct: bool) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            is_direct,
        }
    }

    /// `name@version` label used in logs
    pub fn coordinate(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

impl DependencyNode {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<DependencyNode>) -> Self {
        self.children = children;
        self
    }

    pub fn has_dependencies(&self) -> bool {
        !self.children.is_empty()
    }

    fn matches(&self, name: &str, version: &str) -> bool {
        self.name == name && self.version == version
    }

    /// Collapse the tree into unique `(name, version)` entries, root excluded.
    ///
    /// An entry is direct when at least one of its occurrences is a child of
    /// the root; a direct flag is never downgraded by a later transitive hit.
    /// The result is sorted by name then version.
    pub fn flatten(&self) -> Vec<FlatDependency> {
        let mut seen: BTreeMap<(String, String), bool> = BTreeMap::new();
        let mut stack: Vec<(&DependencyNode, usize)> =
            self.children.iter().rev().map(|child| (child, 1)).collect();

        while let Some((node, depth)) = stack.pop() {
            let is_direct = depth == 1;
            seen.entry((node.name.clone(), node.version.clone()))
                .and_modify(|direct| *direct |= is_direct)
                .or_insert(is_direct);

            stack.extend(node.children.iter().rev().map(|child| (child, depth + 1)));
        }

        seen.into_iter()
            .map(|((name, version), is_direct)| FlatDependency {
                name,
                version,
                is_direct,
            })
            .collect()
    }

    /// Every path from the root to a node matching `name` and `version`,
    /// rendered as `root -> parent -> name`. Empty when nothing matches.
    pub fn find_paths(&self, name: &str, version: &str) -> Vec<String> {
        let mut paths = Vec::new();
        let mut stack: Vec<(&DependencyNode, Vec<&str>)> = self
            .children
            .iter()
            .rev()
            .map(|child| (child, vec![self.name.as_str()]))
            .collect();

        while let Some((node, mut trail)) = stack.pop() {
            trail.push(node.name.as_str());
            if node.matches(name, version) {
                paths.push(trail.join(PATH_SEPARATOR));
            }
            for child in node.children.iter().rev() {
                stack.push((child, trail.clone()));
            }
        }

        paths
    }
}
