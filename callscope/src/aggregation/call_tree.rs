//! Arena-backed call tree rooted at one function.
//!
//! Nodes live in a `Vec` and refer to their children by index, keyed by
//! function id in a `BTreeMap` so iteration order is deterministic. There are
//! no back-pointers: every traversal starts at the root and uses an explicit
//! stack, so pathological call depths cannot overflow the thread stack.
//!
//! Cut subtrees stay in the arena but become unreachable; every traversal
//! only visits nodes reachable from the root.

// Thresholds are percentages of u64 totals
#![allow(clippy::cast_precision_loss)]

use std::collections::{BTreeMap, HashSet};

use crate::domain::{FunctionId, Period};

/// Index of a node inside its [`CallTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

/// One node of a call tree
#[derive(Debug, Clone)]
pub struct CallNode {
    pub function: FunctionId,
    /// `count` is folded in while streaming; `accumulated` is only valid
    /// after [`CallTree::compute_subtree_totals`].
    pub period: Period,
    children: BTreeMap<FunctionId, NodeId>,
}

impl CallNode {
    fn new(function: FunctionId) -> Self {
        Self { function, period: Period::default(), children: BTreeMap::new() }
    }

    #[must_use]
    pub fn self_count(&self) -> u64 {
        self.period.count
    }

    #[must_use]
    pub fn subtree_count(&self) -> u64 {
        self.period.accumulated
    }

    /// Child node ids in ascending function-id order
    pub fn child_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.values().copied()
    }

    #[must_use]
    pub fn child(&self, function: FunctionId) -> Option<NodeId> {
        self.children.get(&function).copied()
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

#[derive(Debug, Clone)]
pub struct CallTree {
    nodes: Vec<CallNode>,
}

impl CallTree {
    #[must_use]
    pub fn new(root: FunctionId) -> Self {
        Self { nodes: vec![CallNode::new(root)] }
    }

    #[must_use]
    pub fn root(&self) -> &CallNode {
        &self.nodes[NodeId::ROOT.0]
    }

    /// # Panics
    /// Panics if `id` did not come from this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &CallNode {
        &self.nodes[id.0]
    }

    /// Follow `path` (function ids below the root) and return the node it ends at.
    #[must_use]
    pub fn find(&self, path: &[FunctionId]) -> Option<&CallNode> {
        let mut node = self.root();
        for function in path {
            node = self.node(node.child(*function)?);
        }
        Some(node)
    }

    /// Fold one path into the tree, creating nodes as needed, and add `count`
    /// to the node the path ends at. An empty path charges the root.
    pub fn add_path<I>(&mut self, path: I, count: u64)
    where
        I: IntoIterator<Item = FunctionId>,
    {
        let mut node = NodeId::ROOT;
        for function in path {
            node = self.child_or_insert(node, function);
        }
        self.nodes[node.0].period.count += count;
    }

    fn child_or_insert(&mut self, parent: NodeId, function: FunctionId) -> NodeId {
        if let Some(child) = self.nodes[parent.0].child(function) {
            return child;
        }
        let child = NodeId(self.nodes.len());
        self.nodes.push(CallNode::new(function));
        self.nodes[parent.0].children.insert(function, child);
        child
    }

    /// Reachable node ids in pre-order (parents before children, children in
    /// ascending function-id order).
    #[must_use]
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            order.push(id);
            // Reverse so the smallest function id is popped first
            stack.extend(self.nodes[id.0].children.values().rev().copied());
        }
        order
    }

    /// Number of nodes reachable from the root
    #[must_use]
    pub fn reachable_len(&self) -> usize {
        self.preorder().len()
    }

    /// Post-order pass setting `accumulated = count + Σ accumulated(children)`.
    ///
    /// Returns the root's subtree total.
    pub fn compute_subtree_totals(&mut self) -> u64 {
        for id in self.preorder().into_iter().rev() {
            let below: u64 = self.nodes[id.0]
                .children
                .values()
                .map(|child| self.nodes[child.0].period.accumulated)
                .sum();
            let node = &mut self.nodes[id.0];
            node.period.accumulated = node.period.count + below;
        }
        self.root().period.accumulated
    }

    /// Record every reachable function in `keep` and drop each child whose
    /// subtree total is below `min_limit`, without descending into it.
    ///
    /// Subtree totals are left as they were, so a second cut with the same
    /// limit removes nothing.
    pub fn cut_edges(&mut self, min_limit: f64, keep: &mut HashSet<FunctionId>) {
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            keep.insert(self.nodes[id.0].function);

            let cut: Vec<FunctionId> = self.nodes[id.0]
                .children
                .iter()
                .filter(|(_, child)| (self.nodes[child.0].period.accumulated as f64) < min_limit)
                .map(|(function, _)| *function)
                .collect();

            let node = &mut self.nodes[id.0];
            for function in cut {
                node.children.remove(&function);
            }
            stack.extend(node.children.values().copied());
        }
    }
}
