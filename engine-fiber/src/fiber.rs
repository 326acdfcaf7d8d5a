//! Fibers and the double-buffered tree the reconciler diffs against.
//!
//! Fiber identity lives in a flat arena keyed by [`FiberId`] rather
//! than an `Rc`/`RefCell` parent-child graph: per the design notes on
//! cyclic references, the arena (here, two `HashMap`s: `current` and
//! `work_in_progress`) owns every node, parent/child/sibling links are
//! plain ids, and there is no cycle to break.

use std::collections::HashMap;

use engine_types::{FiberId, FiberIdAllocator, RefName};
use serde_json::Value;

use crate::element::{ClassComponentFactory, ElementType, FunctionComponent};
use crate::hook::HookChain;
use std::sync::Arc;

bitflags::bitflags! {
    /// Per-fiber work flags, accumulated during reconciliation and
    /// consumed during commit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u16 {
        /// This fiber is new; mount effects should run.
        const PLACEMENT = 0b0000_0001;
        /// This fiber was reused with new props.
        const UPDATE = 0b0000_0010;
        /// This fiber's own flags are set but its subtree also has work.
        const SUBTREE = 0b0000_0100;
        /// This fiber's `ref` prop changed and the ref table needs updating.
        const REF = 0b0000_1000;
        /// This fiber has at least one effect pending for the current phase.
        const HAS_EFFECT = 0b0001_0000;
    }
}

/// One node of the reconciled tree.
pub struct FiberNode {
    /// Stable identity across renders (the arena key).
    pub id: FiberId,
    /// What this fiber renders: intrinsic tag, function, class, or fragment.
    pub ty: ElementType,
    /// Reconciliation key within this fiber's sibling list.
    pub key: Option<String>,
    /// Ref name published to the COM ref table, if any.
    pub ref_name: Option<RefName>,
    /// Props from the last committed render.
    pub props: Value,
    /// Props pending for the render in progress.
    pub pending_props: Value,
    /// Parent fiber, `None` for the root.
    pub parent: Option<FiberId>,
    /// First child, if any.
    pub child: Option<FiberId>,
    /// Next sibling, if any.
    pub sibling: Option<FiberId>,
    /// Position under `parent`.
    pub index: usize,
    /// Instance state for class-like fibers; `None` otherwise.
    pub state_node: Option<Box<dyn crate::element::ClassComponent>>,
    /// Head of the hook chain for function-like fibers.
    pub hooks: HookChain,
    /// Work flags for the render/commit in progress.
    pub flags: Flags,
    /// Old fibers under this node scheduled for deletion this pass.
    pub deletions: Vec<FiberId>,
}

impl FiberNode {
    fn new(id: FiberId, ty: ElementType, key: Option<String>, ref_name: Option<RefName>, props: Value, parent: Option<FiberId>, index: usize) -> Self {
        Self {
            id,
            ty,
            key,
            ref_name,
            props: Value::Null,
            pending_props: props,
            parent,
            child: None,
            sibling: None,
            index,
            state_node: None,
            hooks: HookChain::default(),
            flags: Flags::PLACEMENT,
            deletions: Vec::new(),
        }
    }

    /// Name used in diagnostics and tracing spans.
    pub fn type_name(&self) -> String {
        match &self.ty {
            ElementType::Intrinsic(tag) => tag.name().to_string(),
            ElementType::Function(f) => f.name().to_string(),
            ElementType::Class(c) => c.name().to_string(),
            ElementType::Fragment => "Fragment".to_string(),
        }
    }

    /// Whether two fibers (an old one and a candidate new element)
    /// refer to the same component and reconciliation key, and can
    /// therefore be reused in place.
    pub fn is_same_slot(&self, ty: &ElementType, key: &Option<String>) -> bool {
        &self.ty == ty && &self.key == key
    }

    /// Downcast this fiber's type to a function component reference,
    /// if it is one.
    pub fn as_function(&self) -> Option<&Arc<dyn FunctionComponent>> {
        match &self.ty {
            ElementType::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Downcast this fiber's type to a class component factory
    /// reference, if it is one.
    pub fn as_class_factory(&self) -> Option<&Arc<dyn ClassComponentFactory>> {
        match &self.ty {
            ElementType::Class(c) => Some(c),
            _ => None,
        }
    }
}

/// The fiber tree: an arena of nodes plus the root id. Reconciliation
/// mutates a node's children in place (matched old fibers keep their
/// `FiberId` and hook chain; unmatched ones are deleted and recreated
/// under a freshly allocated id), so there is a single arena rather
/// than the textbook current/work-in-progress pair of trees — the
/// "alternate" is represented implicitly by each fiber's own
/// `props`/`pending_props` split plus the deletions list collected
/// per reconciliation pass.
pub struct FiberTree {
    nodes: HashMap<FiberId, FiberNode>,
    root: Option<FiberId>,
    alloc: FiberIdAllocator,
}

impl Default for FiberTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FiberTree {
    /// An empty tree with no root yet.
    pub fn new() -> Self {
        Self { nodes: HashMap::new(), root: None, alloc: FiberIdAllocator::new() }
    }

    /// This tree's root fiber, if reconciliation has run at least once.
    pub fn root(&self) -> Option<FiberId> {
        self.root
    }

    /// Set the root fiber id. Called once by the reconciler after the
    /// first pass creates it.
    pub fn set_root(&mut self, root: FiberId) {
        self.root = Some(root);
    }

    /// Allocate a fresh fiber id.
    pub fn alloc_id(&self) -> FiberId {
        self.alloc.next()
    }

    /// Insert a newly created fiber, returning its id.
    pub fn insert(&mut self, ty: ElementType, key: Option<String>, ref_name: Option<RefName>, props: Value, parent: Option<FiberId>, index: usize) -> FiberId {
        let id = self.alloc_id();
        let node = FiberNode::new(id, ty, key, ref_name, props, parent, index);
        self.nodes.insert(id, node);
        id
    }

    /// Borrow a fiber.
    pub fn get(&self, id: FiberId) -> Option<&FiberNode> {
        self.nodes.get(&id)
    }

    /// Mutably borrow a fiber.
    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut FiberNode> {
        self.nodes.get_mut(&id)
    }

    /// Remove a fiber from the arena (called after its unmount effects
    /// have run during commit).
    pub fn remove(&mut self, id: FiberId) -> Option<FiberNode> {
        self.nodes.remove(&id)
    }

    /// Children of `parent`, in sibling order.
    pub fn children_of(&self, parent: FiberId) -> Vec<FiberId> {
        let mut out = Vec::new();
        let mut next = self.nodes.get(&parent).and_then(|p| p.child);
        while let Some(id) = next {
            out.push(id);
            next = self.nodes.get(&id).and_then(|n| n.sibling);
        }
        out
    }

    /// Link `children` (in order) under `parent`, replacing its
    /// previous child list pointer.
    pub fn set_children(&mut self, parent: FiberId, children: &[FiberId]) {
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.child = children.first().copied();
        }
        for window in children.windows(2) {
            if let Some(node) = self.nodes.get_mut(&window[0]) {
                node.sibling = Some(window[1]);
            }
        }
        if let Some(&last) = children.last() {
            if let Some(node) = self.nodes.get_mut(&last) {
                node.sibling = None;
            }
        }
    }

    /// Depth-first, children-before-parent order rooted at `start`
    /// (used for unmount walks).
    pub fn dfs_post_order(&self, start: FiberId) -> Vec<FiberId> {
        let mut out = Vec::new();
        self.dfs_post_order_inner(start, &mut out);
        out
    }

    fn dfs_post_order_inner(&self, id: FiberId, out: &mut Vec<FiberId>) {
        for child in self.children_of(id) {
            self.dfs_post_order_inner(child, out);
        }
        out.push(id);
    }

    /// Depth-first, parent-before-children order rooted at `start`
    /// (used for render and mount walks).
    pub fn dfs_pre_order(&self, start: FiberId) -> Vec<FiberId> {
        let mut out = Vec::new();
        self.dfs_pre_order_inner(start, &mut out);
        out
    }

    fn dfs_pre_order_inner(&self, id: FiberId, out: &mut Vec<FiberId>) {
        out.push(id);
        for child in self.children_of(id) {
            self.dfs_pre_order_inner(child, out);
        }
    }

    /// Every `(ref_name, fiber)` pair currently live in the tree,
    /// rooted at `start`. Recomputed wholesale after each commit
    /// rather than diffed incrementally — a fiber losing its ref prop
    /// or being deleted simply stops appearing here, which is what
    /// `spec.md` §4.1's "remove entries for fibers losing a ref or
    /// being deleted" amounts to when the whole table is rebuilt.
    pub fn refs(&self, start: FiberId) -> Vec<(RefName, FiberId)> {
        self.dfs_pre_order(start)
            .into_iter()
            .filter_map(|id| self.get(id).and_then(|n| n.ref_name.clone()).map(|r| (r, id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::IntrinsicTag;

    #[test]
    fn children_preserve_insertion_order() {
        let mut tree = FiberTree::new();
        let parent = tree.insert(ElementType::Fragment, None, None, Value::Null, None, 0);
        let a = tree.insert(ElementType::Intrinsic(IntrinsicTag::Section), None, None, Value::Null, Some(parent), 0);
        let b = tree.insert(ElementType::Intrinsic(IntrinsicTag::Message), None, None, Value::Null, Some(parent), 1);
        tree.set_children(parent, &[a, b]);
        assert_eq!(tree.children_of(parent), vec![a, b]);
    }

    #[test]
    fn post_order_visits_children_before_parent() {
        let mut tree = FiberTree::new();
        let parent = tree.insert(ElementType::Fragment, None, None, Value::Null, None, 0);
        let child = tree.insert(ElementType::Intrinsic(IntrinsicTag::Section), None, None, Value::Null, Some(parent), 0);
        tree.set_children(parent, &[child]);
        let order = tree.dfs_post_order(parent);
        assert_eq!(order, vec![child, parent]);
    }
}
