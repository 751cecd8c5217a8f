//! Build output tree.
//!
//! The build tree mirrors the directories under a build-output root. Stages
//! may only write into directories that are registered here, so every
//! output location is materialized (created on disk and registered) before
//! the stage that fills it runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::util::errors::BerthError;

/// Handle to a directory node in a [`BuildTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
struct DirNode {
    name: String,
    parent: Option<NodeId>,
    children: BTreeMap<String, NodeId>,
    registered: bool,
}

/// Arena of directory nodes rooted at a build-output directory.
#[derive(Debug)]
pub struct BuildTree {
    root_path: PathBuf,
    nodes: Vec<DirNode>,
}

impl BuildTree {
    /// Create a tree whose root node is `root_path`.
    ///
    /// The root is assumed to exist already (it holds the linked binary).
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        BuildTree {
            root_path: root_path.into(),
            nodes: vec![DirNode {
                name: String::new(),
                parent: None,
                children: BTreeMap::new(),
                registered: true,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Existing child directory of `parent` named `name`.
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent.0].children.get(name).copied()
    }

    /// Number of direct children of `node`.
    pub fn child_count(&self, node: NodeId) -> usize {
        self.nodes[node.0].children.len()
    }

    pub fn name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].name
    }

    pub fn is_registered(&self, node: NodeId) -> bool {
        self.nodes[node.0].registered
    }

    /// Absolute path of a node.
    pub fn path(&self, node: NodeId) -> PathBuf {
        let mut names = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let n = &self.nodes[id.0];
            if n.parent.is_some() {
                names.push(n.name.as_str());
            }
            current = n.parent;
        }

        let mut path = self.root_path.clone();
        for name in names.into_iter().rev() {
            path.push(name);
        }
        path
    }

    /// Find the node for a relative path without creating anything.
    pub fn lookup(&self, path: &str, start: NodeId) -> Option<NodeId> {
        if escapes(path) {
            return None;
        }
        split_segments(path).try_fold(start, |dir, name| self.child(dir, name))
    }

    /// Ensure every directory in `path` exists under `start` and return the
    /// deepest node.
    ///
    /// Segments are separated by `/` or `\`; empty and `.` segments are
    /// skipped; a `..` segment is rejected. Existing nodes are reused, so
    /// materializing the same path twice yields the same node and no
    /// duplicates.
    pub fn materialize(&mut self, path: &str, start: NodeId) -> Result<NodeId> {
        if escapes(path) {
            return Err(BerthError::EscapingPath {
                path: path.to_string(),
            }
            .into());
        }

        let mut dir = start;
        for name in split_segments(path) {
            let next = match self.child(dir, name) {
                Some(existing) => existing,
                None => self.insert(dir, name),
            };
            self.register(next)?;
            dir = next;
        }
        Ok(dir)
    }

    /// Create the node's directory on disk and mark it visible to stages.
    pub fn register(&mut self, node: NodeId) -> Result<()> {
        let path = self.path(node);
        if !path.is_dir() {
            std::fs::create_dir_all(&path).context(BerthError::CreateDir { path: path.clone() })?;
            tracing::debug!("created {}", path.display());
        }
        self.nodes[node.0].registered = true;
        Ok(())
    }

    fn insert(&mut self, parent: NodeId, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(DirNode {
            name: name.to_string(),
            parent: Some(parent),
            children: BTreeMap::new(),
            registered: false,
        });
        self.nodes[parent.0].children.insert(name.to_string(), id);
        id
    }
}

fn escapes(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| segment == "..")
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
}
