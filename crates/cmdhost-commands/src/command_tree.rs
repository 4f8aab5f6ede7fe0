use std::{
    collections::{btree_map::Entry, BTreeMap},
    fmt,
    sync::Arc,
};

use crate::{CommandError, CommandHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Handler,
    Tree,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler => f.write_str("command handler"),
            Self::Tree => f.write_str("command tree"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CommandNode {
    Leaf(Arc<CommandHandler>),
    Branch(CommandTree),
}

impl CommandNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Leaf(_) => NodeKind::Handler,
            Self::Branch(_) => NodeKind::Tree,
        }
    }
}

/// Write-once namespace of command handlers keyed by path segment.
///
/// A path holds either a handler or a sub-tree for its whole lifetime.
/// Mounting over an existing handler, or mounting a handler over a sub-tree,
/// fails before anything is modified. Sub-trees mounted on sub-trees merge.
#[derive(Debug, Clone, Default)]
pub struct CommandTree {
    children: BTreeMap<String, CommandNode>,
}

impl CommandTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&CommandNode> {
        self.children.get(name)
    }

    pub fn find(&self, path: &[&str]) -> Option<&CommandNode> {
        let (head, rest) = path.split_first()?;
        let node = self.children.get(*head)?;
        match (node, rest.is_empty()) {
            (_, true) => Some(node),
            (CommandNode::Branch(tree), false) => tree.find(rest),
            (CommandNode::Leaf(_), false) => None,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.children.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Space-joined paths of every handler, in name order.
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_leaf_paths(&mut Vec::new(), &mut paths);
        paths
    }

    pub fn mount(&mut self, path: &[&str], node: CommandNode) -> Result<(), CommandError> {
        if path.is_empty() {
            return match node {
                CommandNode::Branch(tree) => self.merge(tree),
                CommandNode::Leaf(_) => Err(conflict(&[], NodeKind::Tree, NodeKind::Handler)),
            };
        }
        self.check_mount(path, &node, &mut Vec::new())?;
        self.apply_mount(path, node);
        Ok(())
    }

    pub fn mount_leaf(
        &mut self,
        path: &[&str],
        handler: Arc<CommandHandler>,
    ) -> Result<(), CommandError> {
        self.mount(path, CommandNode::Leaf(handler))
    }

    pub fn mount_branch(&mut self, path: &[&str], tree: CommandTree) -> Result<(), CommandError> {
        self.mount(path, CommandNode::Branch(tree))
    }

    pub fn merge(&mut self, other: CommandTree) -> Result<(), CommandError> {
        self.check_merge(&other, &mut Vec::new())?;
        self.apply_merge(other);
        Ok(())
    }

    fn check_mount(
        &self,
        path: &[&str],
        node: &CommandNode,
        prefix: &mut Vec<String>,
    ) -> Result<(), CommandError> {
        let Some((head, rest)) = path.split_first() else {
            return Ok(());
        };
        prefix.push((*head).to_string());
        let result = match (self.children.get(*head), rest.is_empty()) {
            (None, _) => Ok(()),
            (Some(CommandNode::Leaf(_)), true) => {
                Err(conflict(prefix, NodeKind::Handler, node.kind()))
            }
            (Some(CommandNode::Leaf(_)), false) => {
                Err(conflict(prefix, NodeKind::Handler, NodeKind::Tree))
            }
            (Some(CommandNode::Branch(existing)), false) => existing.check_mount(rest, node, prefix),
            (Some(CommandNode::Branch(existing)), true) => match node {
                CommandNode::Branch(incoming) => existing.check_merge(incoming, prefix),
                CommandNode::Leaf(_) => Err(conflict(prefix, NodeKind::Tree, NodeKind::Handler)),
            },
        };
        prefix.pop();
        result
    }

    fn check_merge(&self, other: &CommandTree, prefix: &mut Vec<String>) -> Result<(), CommandError> {
        for (name, node) in &other.children {
            self.check_mount(&[name.as_str()], node, prefix)?;
        }
        Ok(())
    }

    // Callers run `check_mount` first; conflicting slots are left untouched.
    fn apply_mount(&mut self, path: &[&str], node: CommandNode) {
        let Some((head, rest)) = path.split_first() else {
            return;
        };
        if rest.is_empty() {
            match self.children.entry((*head).to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(node);
                }
                Entry::Occupied(mut slot) => {
                    if let (CommandNode::Branch(existing), CommandNode::Branch(incoming)) =
                        (slot.get_mut(), node)
                    {
                        existing.apply_merge(incoming);
                    }
                }
            }
            return;
        }
        let child = self
            .children
            .entry((*head).to_string())
            .or_insert_with(|| CommandNode::Branch(CommandTree::new()));
        if let CommandNode::Branch(subtree) = child {
            subtree.apply_mount(rest, node);
        }
    }

    fn apply_merge(&mut self, other: CommandTree) {
        for (name, node) in other.children {
            self.apply_mount(&[name.as_str()], node);
        }
    }

    fn collect_leaf_paths(&self, prefix: &mut Vec<String>, paths: &mut Vec<String>) {
        for (name, node) in &self.children {
            prefix.push(name.clone());
            match node {
                CommandNode::Leaf(_) => paths.push(prefix.join(" ")),
                CommandNode::Branch(tree) => tree.collect_leaf_paths(prefix, paths),
            }
            prefix.pop();
        }
    }
}

fn conflict(path: &[String], existing: NodeKind, incoming: NodeKind) -> CommandError {
    CommandError::StructuralConflict {
        path: path.join(" "),
        existing,
        incoming,
    }
}
