//! Directory tree reconstruction from a flat search result
//!
//! The tree only reflects the snapshot it was built from: an entry whose
//! parent was not part of the result is a root here even though the parent
//! may well exist on the server.

use super::dn::{self, EntryType};
use super::entry::DirectoryEntry;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// One node of the browse tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub dn: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Unescaped value of the first RDN, used as the display label
    pub label: String,
    /// Child DNs in the order the children appeared in the input
    pub children: Vec<String>,
}

impl TreeNode {
    fn new(dn: &str) -> Self {
        Self {
            dn: dn.to_string(),
            entry_type: dn::classify(dn),
            label: dn::naming_value(dn),
            children: Vec::new(),
        }
    }
}

/// DN-keyed adjacency structure plus the display roots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryTree {
    pub nodes: BTreeMap<String, TreeNode>,
    pub roots: Vec<String>,
}

impl DirectoryTree {
    pub fn get(&self, dn: &str) -> Option<&TreeNode> {
        self.nodes.get(dn)
    }

    pub fn children(&self, dn: &str) -> &[String] {
        self.nodes
            .get(dn)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first walk from the roots, yielding each node with its level.
    pub fn walk(&self) -> Vec<(usize, &TreeNode)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut seen = HashSet::new();
        let mut stack: Vec<(usize, &str)> = self
            .roots
            .iter()
            .rev()
            .map(|dn| (0, dn.as_str()))
            .collect();

        while let Some((level, dn)) = stack.pop() {
            if !seen.insert(dn) {
                continue;
            }
            if let Some(node) = self.nodes.get(dn) {
                out.push((level, node));
                for child in node.children.iter().rev() {
                    stack.push((level + 1, child.as_str()));
                }
            }
        }

        out
    }
}

/// Build the browse tree for `entries`.
///
/// Linking happens after every node exists, so the result does not depend on
/// whether parents precede their children in the input.
pub fn build_tree(entries: &[DirectoryEntry]) -> DirectoryTree {
    let mut nodes: BTreeMap<String, TreeNode> = BTreeMap::new();
    let mut order: Vec<&str> = Vec::with_capacity(entries.len());

    for entry in entries {
        if nodes.insert(entry.dn.clone(), TreeNode::new(&entry.dn)).is_none() {
            order.push(entry.dn.as_str());
        }
    }

    let mut roots = Vec::new();
    for child in &order {
        match dn::parent_of(child).filter(|p| nodes.contains_key(*p) && p != child) {
            Some(parent) => {
                let parent = parent.to_string();
                if let Some(node) = nodes.get_mut(&parent) {
                    if !node.children.iter().any(|c| c == child) {
                        node.children.push(child.to_string());
                    }
                }
            }
            None => roots.push(child.to_string()),
        }
    }

    DirectoryTree { nodes, roots }
}
