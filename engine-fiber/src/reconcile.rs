//! Child-list reconciliation: the diffing algorithm that decides
//! which old fibers are reused, placed, or deleted.

use std::collections::HashMap;

use engine_types::RefName;
use serde_json::Value;

use crate::element::{Element, ElementType, Node};
use crate::fiber::{FiberTree, Flags};

/// Outcome of reconciling one child list: the ordered ids of the
/// resulting children, plus any old fibers under this parent that
/// must be deleted.
pub struct ReconcileResult {
    /// Resulting children, in order.
    pub children: Vec<engine_types::FiberId>,
    /// Old fibers (previously under this parent) with no match this
    /// pass; scheduled for unmount during commit.
    pub deletions: Vec<engine_types::FiberId>,
}

/// A flattened, fiber-shaped view of one element: either a real
/// element or a coerced text/native-block leaf. Fragments are
/// expanded inline at this stage (rule 5: a Fragment contributes no
/// fiber of its own).
enum Slot {
    Element(Element),
    Text(String),
    Block(engine_types::ContentBlock),
}

fn expand(nodes: Vec<Node>, out: &mut Vec<Slot>) {
    for node in nodes {
        match node {
            Node::Element(element) => {
                if matches!(element.ty, ElementType::Fragment) {
                    expand(element.children, out);
                } else {
                    out.push(Slot::Element(element));
                }
            }
            Node::Text(t) => out.push(Slot::Text(t)),
            Node::Block(b) => out.push(Slot::Block(b)),
            Node::List(items) => expand(items, out),
            Node::Empty => {}
        }
    }
}

/// A text/block leaf's synthetic element type and key, so it can
/// share the by-index/by-key matching machinery below. Leaves always
/// reuse by position only (they carry no key).
fn slot_identity(slot: &Slot) -> (Option<&ElementType>, Option<&str>) {
    match slot {
        Slot::Element(e) => (Some(&e.ty), e.key.as_deref()),
        Slot::Text(_) | Slot::Block(_) => (None, None),
    }
}

fn slot_props(slot: &Slot) -> Value {
    match slot {
        Slot::Element(e) => e.props.clone(),
        Slot::Text(t) => Value::String(t.clone()),
        Slot::Block(b) => serde_json::to_value(b).unwrap_or(Value::Null),
    }
}

fn slot_ref(slot: &Slot) -> Option<RefName> {
    match slot {
        Slot::Element(e) => e.ref_name.clone(),
        _ => None,
    }
}

fn slot_children(slot: Slot) -> Vec<Node> {
    match slot {
        Slot::Element(e) => e.children,
        Slot::Text(_) | Slot::Block(_) => Vec::new(),
    }
}

fn slot_type(slot: &Slot) -> ElementType {
    match slot {
        Slot::Element(e) => e.ty.clone(),
        Slot::Text(_) => ElementType::Intrinsic(crate::element::IntrinsicTag::Message),
        Slot::Block(_) => ElementType::Intrinsic(crate::element::IntrinsicTag::Message),
    }
}

/// Reconcile `children` (a fresh element/text/block list produced by
/// rendering `parent`) against whatever fibers currently sit under
/// `parent` in `tree`.
///
/// Implements the two-pass keyed match from `spec.md` §4.1: fibers
/// with a key are matched by key regardless of position; fibers
/// without a key are matched by position, requiring identical type.
pub fn reconcile_children(tree: &mut FiberTree, parent: engine_types::FiberId, children: Vec<Node>) -> ReconcileResult {
    let mut slots = Vec::new();
    expand(children, &mut slots);

    let old_children = tree.children_of(parent);
    let mut old_by_key: HashMap<String, engine_types::FiberId> = HashMap::new();
    let mut old_unkeyed: Vec<engine_types::FiberId> = Vec::new();
    for &old_id in &old_children {
        if let Some(node) = tree.get(old_id) {
            match &node.key {
                Some(k) => {
                    old_by_key.insert(k.clone(), old_id);
                }
                None => old_unkeyed.push(old_id),
            }
        }
    }

    let mut matched = std::collections::HashSet::new();
    let mut result_children = Vec::with_capacity(slots.len());
    let mut unkeyed_cursor = 0usize;

    for (index, slot) in slots.into_iter().enumerate() {
        let (ty_ref, key) = slot_identity(&slot);
        let new_type = ty_ref.cloned().unwrap_or_else(|| slot_type(&slot));
        let props = slot_props(&slot);
        let ref_name = slot_ref(&slot);

        let reused = if let Some(k) = key {
            old_by_key.get(k).copied().filter(|&id| {
                tree.get(id).map(|n| n.is_same_slot(&new_type, &Some(k.to_string()))).unwrap_or(false)
            })
        } else {
            // Positional match: walk forward from the cursor looking
            // for the next unkeyed old fiber whose type matches.
            let mut found = None;
            let mut i = unkeyed_cursor;
            while i < old_unkeyed.len() {
                let candidate = old_unkeyed[i];
                if !matched.contains(&candidate) {
                    let same = tree.get(candidate).map(|n| n.is_same_slot(&new_type, &None)).unwrap_or(false);
                    if same {
                        found = Some(candidate);
                        unkeyed_cursor = i + 1;
                        break;
                    }
                }
                i += 1;
            }
            found
        };

        let fiber_id = if let Some(old_id) = reused {
            matched.insert(old_id);
            if let Some(node) = tree.get_mut(old_id) {
                node.pending_props = props.clone();
                node.index = index;
                node.ref_name = ref_name.clone();
                node.flags = Flags::UPDATE;
            }
            old_id
        } else {
            tree.insert(new_type, key.map(str::to_string), ref_name, props, Some(parent), index)
        };

        let grandchildren = slot_children(slot);
        if !grandchildren.is_empty() {
            let sub = reconcile_children(tree, fiber_id, grandchildren);
            tree.set_children(fiber_id, &sub.children);
            if let Some(node) = tree.get_mut(fiber_id) {
                node.deletions = sub.deletions;
            }
        }

        result_children.push(fiber_id);
    }

    let mut deletions = Vec::new();
    for &old_id in &old_children {
        if !matched.contains(&old_id) {
            deletions.push(old_id);
        }
    }

    ReconcileResult { children: result_children, deletions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::IntrinsicTag;

    fn msg(key: &str) -> Node {
        Node::Element(Element::intrinsic(IntrinsicTag::Message, Value::Null).with_key(key))
    }

    #[test]
    fn permuted_keys_reuse_every_fiber() {
        let mut tree = FiberTree::new();
        let root = tree.insert(ElementType::Fragment, None, None, Value::Null, None, 0);
        let first = reconcile_children(&mut tree, root, vec![msg("a"), msg("b"), msg("c")]);
        tree.set_children(root, &first.children);
        assert!(first.deletions.is_empty());

        let second = reconcile_children(&mut tree, root, vec![msg("c"), msg("a"), msg("b")]);
        assert!(second.deletions.is_empty());
        let mut sorted_first = first.children.clone();
        sorted_first.sort();
        let mut sorted_second = second.children.clone();
        sorted_second.sort();
        assert_eq!(sorted_first, sorted_second, "same set of fiber ids reused, just reordered");
    }

    #[test]
    fn unmatched_old_fiber_is_scheduled_for_deletion() {
        let mut tree = FiberTree::new();
        let root = tree.insert(ElementType::Fragment, None, None, Value::Null, None, 0);
        let first = reconcile_children(&mut tree, root, vec![msg("a"), msg("b")]);
        tree.set_children(root, &first.children);

        let second = reconcile_children(&mut tree, root, vec![msg("a")]);
        assert_eq!(second.deletions.len(), 1);
    }

    #[test]
    fn fragment_contributes_no_fiber_children_are_inlined() {
        let mut tree = FiberTree::new();
        let root = tree.insert(ElementType::Fragment, None, None, Value::Null, None, 0);
        let fragment = Node::Element(Element::fragment(vec![msg("a"), msg("b")]));
        let result = reconcile_children(&mut tree, root, vec![fragment]);
        assert_eq!(result.children.len(), 2, "fragment's two children inlined, no fiber for the fragment itself");
    }
}
