//! Budget Tree Builder
//!
//! Reconstructs the budget hierarchy from the flat item list and assigns
//! hierarchical sequence numbers ("2.1.3") and nesting depth.
//!
//! # Algorithm
//!
//! 1. Index items by id. Stages, and search placeholders without a parent, are roots.
//! 2. Every other item is attached to its parent when the parent exists,
//!    otherwise it is collected as an orphan.
//! 3. Orphans are attached to one synthetic trailing stage (never persisted).
//! 4. Roots are sorted by id with the synthetic stage always last; children
//!    are sorted by id.
//! 5. A depth-first walk numbers the nodes: roots get their 1-based position,
//!    children get `"{parent}.{position}"`.
//!
//! Because an item has a single `parent_id`, every node reachable from a root
//! is attached exactly once. Items caught in a parent cycle have no root
//! ancestor; they stay in the arena without a sequence number and are never
//! emitted.
//!
//! # Performance
//!
//! O(n log n) for the sorts, O(n) for everything else. The tree is cheap
//! enough to rebuild from scratch after every mutation.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::{BudgetItem, ItemId, ItemKind};

/// Key of a tree node: a real item or the synthetic orphan stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKey {
    Item(ItemId),
    Unassigned,
}

impl NodeKey {
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            NodeKey::Item(id) => Some(*id),
            NodeKey::Unassigned => None,
        }
    }
}

impl From<ItemId> for NodeKey {
    fn from(id: ItemId) -> Self {
        NodeKey::Item(id)
    }
}

/// A node of the built tree
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub key: NodeKey,

    pub kind: ItemKind,

    /// Index into [`BudgetTree::items`]; `None` for the synthetic stage
    pub item_index: Option<usize>,

    /// Arena indices of the children, sorted by id
    pub children: Vec<usize>,

    /// Hierarchical label; empty for unreachable nodes
    pub sequence_number: String,

    /// Nesting level (root = 0)
    pub depth: usize,
}

impl TreeNode {
    pub fn is_synthetic(&self) -> bool {
        self.key == NodeKey::Unassigned
    }
}

/// Per-node expansion state of the rendered table
///
/// Containers default to collapsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    expanded: HashSet<NodeKey>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expand(&mut self, key: NodeKey) {
        self.expanded.insert(key);
    }

    pub fn collapse(&mut self, key: NodeKey) {
        self.expanded.remove(&key);
    }

    /// Flip the expansion state, returning the new state
    pub fn toggle(&mut self, key: NodeKey) -> bool {
        if self.expanded.remove(&key) {
            false
        } else {
            self.expanded.insert(key);
            true
        }
    }

    pub fn is_expanded(&self, key: &NodeKey) -> bool {
        self.expanded.contains(key)
    }

    /// Re-key entries after transient ids were replaced by durable ones
    pub fn remap(&mut self, mapping: &HashMap<ItemId, ItemId>) {
        self.expanded = self
            .expanded
            .drain()
            .map(|key| match key {
                NodeKey::Item(id) => NodeKey::Item(mapping.get(&id).copied().unwrap_or(id)),
                other => other,
            })
            .collect();
    }

    /// Drop entries whose node no longer exists
    pub fn retain_existing(&mut self, tree: &BudgetTree) {
        self.expanded.retain(|key| tree.contains(key));
    }
}

/// One entry of the render-ready sequence
#[derive(Debug, Clone, PartialEq)]
pub struct TreeRow {
    pub key: NodeKey,
    pub node_index: usize,
    pub sequence_number: String,
    pub depth: usize,
    pub has_children: bool,
    pub expanded: bool,
}

/// The budget forest built from a flat item list
#[derive(Debug, Clone)]
pub struct BudgetTree {
    items: Vec<BudgetItem>,
    nodes: Vec<TreeNode>,
    roots: Vec<usize>,
    index: HashMap<NodeKey, usize>,
    orphan_description: String,
}

impl BudgetTree {
    /// Build the forest from `items`
    ///
    /// `orphan_description` labels the synthetic stage created when some items
    /// reference a parent that does not exist.
    pub fn build(items: &[BudgetItem], orphan_description: &str) -> Self {
        let items = items.to_vec();

        let mut nodes: Vec<TreeNode> = items
            .iter()
            .enumerate()
            .map(|(i, item)| TreeNode {
                key: NodeKey::Item(item.id),
                kind: item.kind,
                item_index: Some(i),
                children: Vec::new(),
                sequence_number: String::new(),
                depth: 0,
            })
            .collect();

        let mut index: HashMap<NodeKey, usize> = HashMap::with_capacity(nodes.len() + 1);
        for (i, item) in items.iter().enumerate() {
            index.insert(NodeKey::Item(item.id), i);
        }

        let mut roots: Vec<usize> = Vec::new();
        let mut orphans: Vec<usize> = Vec::new();

        for (i, item) in items.iter().enumerate() {
            let is_root = match item.kind {
                ItemKind::Stage => true,
                ItemKind::SearchPlaceholder => item.parent_id.is_none(),
                ItemKind::Composition => false,
            };
            if is_root {
                roots.push(i);
                continue;
            }

            match item
                .parent_id
                .and_then(|parent| index.get(&NodeKey::Item(parent)).copied())
            {
                Some(parent_index) => nodes[parent_index].children.push(i),
                None => orphans.push(i),
            }
        }

        let sort_key = |nodes: &[TreeNode], i: usize| nodes[i].key.item_id();

        roots.sort_by_key(|&i| sort_key(&nodes, i));

        if !orphans.is_empty() {
            tracing::debug!(
                "Attaching {} orphaned item(s) to the unassigned stage",
                orphans.len()
            );
            let synthetic = nodes.len();
            nodes.push(TreeNode {
                key: NodeKey::Unassigned,
                kind: ItemKind::Stage,
                item_index: None,
                children: orphans,
                sequence_number: String::new(),
                depth: 0,
            });
            index.insert(NodeKey::Unassigned, synthetic);
            roots.push(synthetic);
        }

        for i in 0..nodes.len() {
            let mut children = std::mem::take(&mut nodes[i].children);
            children.sort_by_key(|&c| sort_key(&nodes, c));
            nodes[i].children = children;
        }

        let mut tree = Self {
            items,
            nodes,
            roots,
            index,
            orphan_description: orphan_description.to_string(),
        };
        tree.assign_numbering();
        tree
    }

    fn assign_numbering(&mut self) {
        // Explicit stack: (node, label, depth)
        let mut stack: Vec<(usize, String, usize)> = self
            .roots
            .iter()
            .enumerate()
            .rev()
            .map(|(position, &root)| (root, (position + 1).to_string(), 0))
            .collect();

        while let Some((node, label, depth)) = stack.pop() {
            for (position, &child) in self.nodes[node].children.iter().enumerate().rev() {
                stack.push((child, format!("{}.{}", label, position + 1), depth + 1));
            }
            self.nodes[node].sequence_number = label;
            self.nodes[node].depth = depth;
        }
    }

    /// The items the tree was built from, in their original order
    pub fn items(&self) -> &[BudgetItem] {
        &self.items
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Arena indices of the roots, in display order
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn node(&self, key: &NodeKey) -> Option<&TreeNode> {
        self.index.get(key).map(|&i| &self.nodes[i])
    }

    /// The item behind a node; `None` for the synthetic stage
    pub fn item(&self, node_index: usize) -> Option<&BudgetItem> {
        self.nodes
            .get(node_index)
            .and_then(|node| node.item_index)
            .map(|i| &self.items[i])
    }

    /// Description shown for a node
    pub fn description(&self, node_index: usize) -> &str {
        match self.item(node_index) {
            Some(item) => &item.description,
            None => &self.orphan_description,
        }
    }

    pub fn sequence_number(&self, key: &NodeKey) -> Option<&str> {
        self.node(key)
            .map(|node| node.sequence_number.as_str())
            .filter(|label| !label.is_empty())
    }

    pub fn depth(&self, key: &NodeKey) -> Option<usize> {
        self.node(key).map(|node| node.depth)
    }

    /// Keys of the direct children of `key`, in display order
    pub fn children(&self, key: &NodeKey) -> Vec<NodeKey> {
        self.node(key)
            .map(|node| node.children.iter().map(|&c| self.nodes[c].key).collect())
            .unwrap_or_default()
    }

    pub fn has_unassigned(&self) -> bool {
        self.index.contains_key(&NodeKey::Unassigned)
    }

    /// All reachable nodes in depth-first display order, ignoring expansion
    pub fn walk(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            order.push(node);
            stack.extend(self.nodes[node].children.iter().rev().copied());
        }
        order
    }

    /// Render-ready rows honoring the expansion state
    ///
    /// A node is always emitted; its children only when it is expanded.
    /// Collapsed subtrees stay in the tree for later toggling.
    pub fn flatten(&self, view: &ViewState) -> Vec<TreeRow> {
        let mut rows = Vec::new();
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            let expanded = view.is_expanded(&node.key);
            rows.push(TreeRow {
                key: node.key,
                node_index: i,
                sequence_number: node.sequence_number.clone(),
                depth: node.depth,
                has_children: !node.children.is_empty(),
                expanded,
            });
            if expanded {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        rows
    }
}
