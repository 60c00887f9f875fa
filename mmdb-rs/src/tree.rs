//! An arena tree for parse results.
//!
//! Nodes are added bottom-up: children first, then the node which owns them,
//! so the root is always the last node added.  Node ids are 1-based and 0 is
//! the null link.

use std::ops::Index;

/// Index of a node in its tree.
pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TreeNode<T> {
    item: T,
    first_child: NodeId,
    next_sibling: NodeId,
}

/// A tree stored as first-child / next-sibling links in a flat array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree<T> {
    nodes: Vec<TreeNode<T>>,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Tree { nodes: vec![] }
    }
}

impl<T> Tree<T> {
    /// Adds a node owning `children`, which must already be in the tree and
    /// must not have a parent yet.
    pub fn add_node(&mut self, item: T, children: &[NodeId]) -> NodeId {
        let mut first_child = 0;
        let mut previous: Option<NodeId> = None;
        for &child in children {
            assert!(
                self.node(child).next_sibling == 0,
                "child added to a second parent"
            );
            match previous {
                None => first_child = child,
                Some(previous) => self.nodes[previous - 1].next_sibling = child,
            }
            previous = Some(child);
        }
        self.nodes.push(TreeNode {
            item,
            first_child,
            next_sibling: 0,
        });
        self.nodes.len()
    }

    #[inline]
    fn node(&self, node_id: NodeId) -> &TreeNode<T> {
        assert!(
            node_id > 0 && node_id <= self.nodes.len(),
            "node {node_id} out of range"
        );
        &self.nodes[node_id - 1]
    }

    /// Number of nodes.
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Iterator through the children of the given node.
    #[must_use]
    pub fn children_iter(&self, node_id: NodeId) -> SiblingIter<'_, T> {
        SiblingIter {
            tree: self,
            current_id: self.first_child(node_id),
        }
    }

    /// The first child of a node, if any.
    #[must_use]
    pub fn first_child(&self, node_id: NodeId) -> Option<NodeId> {
        match self.node(node_id).first_child {
            0 => None,
            id => Some(id),
        }
    }

    /// The next sibling of a node, or `None` for the last child.
    #[must_use]
    pub fn next_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        match self.node(node_id).next_sibling {
            0 => None,
            id => Some(id),
        }
    }

    /// Returns true if the node has children.
    #[must_use]
    pub fn has_children(&self, node_id: NodeId) -> bool {
        self.node(node_id).first_child != 0
    }

    /// Items of all nodes in insertion order, which is a postorder.
    pub fn node_iter(&self) -> impl ExactSizeIterator<Item = &T> + '_ {
        self.nodes.iter().map(|node| &node.item)
    }
}

impl<T> Index<NodeId> for Tree<T> {
    type Output = T;

    fn index(&self, node_id: NodeId) -> &T {
        &self.node(node_id).item
    }
}

/// An iterator through sibling nodes.
#[derive(Debug)]
pub struct SiblingIter<'a, T> {
    tree: &'a Tree<T>,
    current_id: Option<NodeId>,
}

impl<T> Iterator for SiblingIter<'_, T> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.current_id?;
        self.current_id = self.tree.next_sibling(current);
        Some(current)
    }
}
