//! The render-reconcile-commit walk.
//!
//! One call to [`render_and_commit`] performs exactly one
//! render+commit pass (step 2 of the compile-stabilization loop in
//! `spec.md` §4.1): it (re)renders every function/class fiber,
//! reconciles each fiber's produced children against the previous
//! tree, collects intrinsic-tag contributions into a
//! [`CompiledStructure`], and fires mount/unmount/commit-phase
//! effects in the prescribed DFS order.

use std::sync::Arc;

use engine_types::{ContentBlock, FiberId, Message, Role, SectionId, Visibility};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::effect::EffectSchedule;
use crate::element::{ElementType, IntrinsicTag, Node, RecoveryAction};
use crate::error::RenderError;
use crate::fiber::{FiberTree, Flags};
use crate::hook::{Com, EffectPhase, RenderCx, UpdateQueue};
use crate::reconcile::reconcile_children;
use crate::structure::{
    CompiledEphemeral, CompiledSection, CompiledStructure, CompiledTimelineEntry, CompiledTool, EphemeralPosition,
    SectionContent, SystemMessageItem, SystemMessageSource,
};

/// Intrinsic tags contribute no fiber children of their own worth
/// reconciling further than their literal authored children (they are
/// not rendered through a component). Function/class fibers are the
/// opposite: their authored children are discarded here and replaced
/// by whatever their own render call produces.
fn renders_via_component(ty: &ElementType) -> bool {
    matches!(ty, ElementType::Function(_) | ElementType::Class(_))
}

/// Render and reconcile one fiber's subtree, recursing into children.
/// `order` is a monotonic render-order counter used to keep
/// structure-collection items (sections, timeline entries, system
/// message contributions) in deterministic order.
fn render_fiber<'a>(
    tree: &'a mut FiberTree,
    fiber: FiberId,
    com: &'a Arc<dyn Com>,
    queue: Arc<UpdateQueue>,
    structure: &'a mut CompiledStructure,
    schedule: &'a mut EffectSchedule,
    renderer: Option<String>,
    order: &'a mut usize,
) -> BoxFuture<'a, Result<(), RenderError>> {
    async move {
        let ty = tree.get(fiber).map(|n| n.ty.clone());
        let Some(ty) = ty else {
            return Ok(());
        };

        if renders_via_component(&ty) {
            render_component(tree, fiber, &ty, com, Arc::clone(&queue), structure, schedule, renderer.clone(), order).await?;
        } else if let ElementType::Intrinsic(tag) = &ty {
            collect_intrinsic(tree, fiber, *tag, structure, renderer.clone(), order);
            let children = tree.children_of(fiber);
            for child in children {
                render_fiber(tree, child, com, Arc::clone(&queue), structure, schedule, renderer.clone(), order).await?;
            }
        } else {
            let children = tree.children_of(fiber);
            for child in children {
                render_fiber(tree, child, com, Arc::clone(&queue), structure, schedule, renderer.clone(), order).await?;
            }
        }
        Ok(())
    }
    .boxed()
}

async fn render_component<'a>(
    tree: &'a mut FiberTree,
    fiber: FiberId,
    ty: &ElementType,
    com: &'a Arc<dyn Com>,
    queue: Arc<UpdateQueue>,
    structure: &'a mut CompiledStructure,
    schedule: &'a mut EffectSchedule,
    renderer: Option<String>,
    order: &'a mut usize,
) -> Result<(), RenderError> {
    let (name, props, pending_children) = {
        let node = tree.get(fiber).expect("fiber exists during render");
        (node.type_name(), node.pending_props.clone(), node.props.clone())
    };
    let _ = pending_children;

    let produced: Vec<Node> = match ty {
        ElementType::Function(f) => {
            let old_hooks = {
                let node = tree.get_mut(fiber).expect("fiber exists during render");
                std::mem::take(&mut node.hooks)
            };
            let mut cx = RenderCx::new(fiber, &name, &old_hooks, Arc::clone(&queue), Arc::clone(com), &props);
            let result = f
                .render(&props, &mut cx)
                .await
                .map_err(|e| RenderError::ComponentFailed { component: name.clone(), message: e.to_string() });
            match result {
                Ok(nodes) => {
                    let (committed_hooks, effects) = cx.finish().map_err(RenderError::Hook)?;
                    schedule.insert(fiber, effects);
                    if let Some(node) = tree.get_mut(fiber) {
                        node.hooks = committed_hooks;
                    }
                    nodes
                }
                Err(e) => {
                    if let Some(node) = tree.get_mut(fiber) {
                        node.hooks = old_hooks;
                    }
                    return Err(e);
                }
            }
        }
        ElementType::Class(factory) => {
            let needs_create = tree.get(fiber).map(|n| n.state_node.is_none()).unwrap_or(true);
            if needs_create {
                let instance = factory.create(&props);
                if let Some(node) = tree.get_mut(fiber) {
                    node.state_node = Some(instance);
                }
            }
            let old_hooks = {
                let node = tree.get_mut(fiber).expect("fiber exists during render");
                std::mem::take(&mut node.hooks)
            };
            let mut cx = RenderCx::new(fiber, &name, &old_hooks, Arc::clone(&queue), Arc::clone(com), &props);
            let node = tree.get_mut(fiber).expect("fiber exists during render");
            node.state_node.as_mut().expect("constructed above").set_props(&props);
            let state_node = node.state_node.as_mut().expect("constructed above");
            let result = state_node
                .render(&mut cx)
                .await
                .map_err(|e| RenderError::ComponentFailed { component: name.clone(), message: e.to_string() });
            match result {
                Ok(nodes) => {
                    let finished = cx.finish().map_err(RenderError::Hook)?;
                    schedule.insert(fiber, finished.1);
                    if let Some(node) = tree.get_mut(fiber) {
                        node.hooks = finished.0;
                    }
                    nodes
                }
                Err(e) => {
                    if let Some(node) = tree.get_mut(fiber) {
                        node.hooks = old_hooks;
                    }
                    return Err(e);
                }
            }
        }
        _ => unreachable!("render_component only called for function/class fibers"),
    };

    if let Some(node) = tree.get_mut(fiber) {
        node.props = node.pending_props.clone();
    }

    let reconciled = reconcile_children(tree, fiber, produced);
    tree.set_children(fiber, &reconciled.children);
    if let Some(node) = tree.get_mut(fiber) {
        node.deletions = reconciled.deletions;
    }

    let children = tree.children_of(fiber);
    for child in children {
        render_fiber(tree, child, com, Arc::clone(&queue), structure, schedule, renderer.clone(), order).await?;
    }
    Ok(())
}

fn prop_str(props: &Value, key: &str) -> Option<String> {
    props.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn collect_intrinsic(tree: &FiberTree, fiber: FiberId, tag: IntrinsicTag, structure: &mut CompiledStructure, renderer: Option<String>, order: &mut usize) {
    let node = tree.get(fiber).expect("intrinsic fiber exists");
    let props = node.pending_props.clone();
    let index = {
        *order += 1;
        *order
    };

    match tag {
        IntrinsicTag::Section => {
            let id = prop_str(&props, "id").unwrap_or_else(|| fiber.to_string());
            let title = prop_str(&props, "title");
            let text = collect_text(tree, fiber);
            let visibility = visibility_of(&props);
            structure.add_section(CompiledSection {
                id: SectionId::new(id.clone()),
                title: title.clone(),
                content: SectionContent::Text(text),
                visibility,
                tags: string_array(&props, "tags"),
                metadata: props.get("metadata").cloned().unwrap_or(Value::Null),
                renderer: renderer.clone(),
                formatted: None,
            });
            structure.system_message_items.push(SystemMessageItem {
                source: SystemMessageSource::Section(SectionId::new(id)),
                index,
                renderer,
            });
        }
        IntrinsicTag::Message => {
            let role = match prop_str(&props, "role").as_deref() {
                Some("assistant") => Role::Assistant,
                Some("tool") => Role::Tool,
                Some("event") => Role::Event,
                Some("system") => Role::System,
                _ => Role::User,
            };
            let text = collect_text(tree, fiber);
            if role == Role::System {
                structure.system_message_items.push(SystemMessageItem {
                    source: SystemMessageSource::Loose(text),
                    index,
                    renderer,
                });
            } else {
                let message = Message::new(role, vec![ContentBlock::text(text)]);
                structure.timeline_entries.push(CompiledTimelineEntry {
                    message,
                    visibility: visibility_of(&props),
                    tags: string_array(&props, "tags"),
                    renderer,
                    index,
                });
            }
        }
        IntrinsicTag::Tool => {
            if let Some(name) = prop_str(&props, "name") {
                structure.tools.push(CompiledTool {
                    name,
                    input_schema: props.get("inputSchema").cloned(),
                    description: prop_str(&props, "description"),
                });
            }
        }
        IntrinsicTag::Ephemeral => {
            let position = match prop_str(&props, "position").as_deref() {
                Some("end") => EphemeralPosition::End,
                Some("before-user") => EphemeralPosition::BeforeUser,
                Some("after-system") => EphemeralPosition::AfterSystem,
                Some("flow") => EphemeralPosition::Flow,
                _ => EphemeralPosition::Start,
            };
            let order_value = props.get("order").and_then(|v| v.as_i64()).unwrap_or(0);
            let text = collect_text(tree, fiber);
            structure.ephemeral.push(CompiledEphemeral {
                content: vec![ContentBlock::text(text)],
                position,
                order: order_value,
                kind: prop_str(&props, "type"),
                id: prop_str(&props, "id"),
                tags: string_array(&props, "tags"),
                metadata: props.get("metadata").cloned().unwrap_or(Value::Null),
            });
        }
        IntrinsicTag::Model => {
            structure.model = prop_str(&props, "id").or_else(|| prop_str(&props, "name"));
        }
        IntrinsicTag::ModelOptions => {
            structure.model_options = Some(props.clone());
        }
        IntrinsicTag::Timeline | IntrinsicTag::Fork | IntrinsicTag::Spawn | IntrinsicTag::Complete | IntrinsicTag::Renderer => {
            // Timeline is purely a positional marker; Fork/Spawn/Complete are
            // interpreted by the orchestrator (engine-orchestrator), not the
            // structure collector. Renderer-mode resolution happens via the
            // `renderer` parameter threaded through this walk, not here.
        }
    }

    if let Some(obj) = props.get("metadata").and_then(|v| v.as_object()) {
        for (k, v) in obj {
            structure.metadata.insert(k.clone(), v.clone());
        }
    }
}

fn visibility_of(props: &Value) -> Visibility {
    match prop_str(props, "visibility").as_deref() {
        Some("observer") => Visibility::Observer,
        Some("log") => Visibility::Log,
        _ => Visibility::Model,
    }
}

fn string_array(props: &Value, key: &str) -> Vec<String> {
    props
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn collect_text(tree: &FiberTree, fiber: FiberId) -> String {
    let mut parts = Vec::new();
    for child in tree.children_of(fiber) {
        if let Some(node) = tree.get(child) {
            if let ElementType::Intrinsic(IntrinsicTag::Message) = &node.ty {
                if let Some(s) = node.pending_props.as_str() {
                    parts.push(s.to_string());
                    continue;
                }
            }
        }
    }
    parts.join("\n")
}

/// Walk fibers scheduled for deletion bottom-up, running unmount
/// effects, tearing down hook chains, and removing them from the
/// arena.
fn commit_deletions(tree: &mut FiberTree, roots: &[FiberId], schedule: &mut EffectSchedule) {
    for &root in roots {
        let order = tree.dfs_post_order(root);
        for fiber in order {
            let cleanups = schedule.fire(fiber, EffectPhase::Unmount);
            if let Some(node) = tree.get_mut(fiber) {
                node.hooks.teardown();
            }
            for (_, cleanup) in cleanups {
                if let Some(cleanup) = cleanup {
                    cleanup();
                }
            }
            tree.remove(fiber);
        }
    }
}

/// Fire every scheduled `Mount` and `Commit` effect across the tree,
/// in pre-order (parents mount before their children settle, matching
/// "mount effects at end of commit"). Cleanups are stored back onto
/// each fiber's hook chain rather than invoked immediately — they run
/// before that hook's next effect and at unmount (`HookChain::teardown`).
fn commit_mounts(tree: &mut FiberTree, root: FiberId, schedule: &mut EffectSchedule) {
    for fiber in tree.dfs_pre_order(root) {
        store_phase_cleanups(tree, fiber, schedule, EffectPhase::Mount);
        store_phase_cleanups(tree, fiber, schedule, EffectPhase::Commit);
    }
}

/// Fire every effect scheduled for `phase` across `root`'s subtree, in
/// DFS pre-order, running the previous cleanup for a given hook (if
/// any) before its new `create` and storing the fresh cleanup back.
/// Used by the orchestrator to drive `TickStart`/`AfterCompile`/
/// `TickEnd`/`OnMessage` effects outside the render+commit walk proper.
pub fn fire_phase_over_tree(tree: &mut FiberTree, root: FiberId, schedule: &mut EffectSchedule, phase: EffectPhase) {
    for fiber in tree.dfs_pre_order(root) {
        store_phase_cleanups(tree, fiber, schedule, phase);
    }
}

fn store_phase_cleanups(tree: &mut FiberTree, fiber: FiberId, schedule: &mut EffectSchedule, phase: EffectPhase) {
    let results = schedule.fire(fiber, phase);
    if results.is_empty() {
        return;
    }
    if let Some(node) = tree.get_mut(fiber) {
        for (index, cleanup) in results {
            if let Some(previous) = node.hooks.take_destroy(index) {
                previous();
            }
            if let Some(cleanup) = cleanup {
                node.hooks.set_destroy(index, cleanup);
            }
        }
    }
}

/// Perform one full render+reconcile+commit pass starting from
/// `root_element` against whatever tree `tree` currently holds.
pub async fn render_and_commit(
    tree: &mut FiberTree,
    root_element: crate::element::Element,
    com: Arc<dyn Com>,
    queue: Arc<UpdateQueue>,
) -> Result<(CompiledStructure, EffectSchedule), RenderError> {
    let root_children = vec![Node::Element(root_element)];
    let existing_root = tree.root();
    let reconciled = match existing_root {
        Some(root) => reconcile_children(tree, root, root_children),
        None => {
            let synthetic_root = tree.insert(ElementType::Fragment, None, None, Value::Null, None, 0);
            tree.set_root(synthetic_root);
            reconcile_children(tree, synthetic_root, root_children)
        }
    };
    let root = tree.root().expect("root set above");
    tree.set_children(root, &reconciled.children);

    let mut structure = CompiledStructure::new();
    let mut schedule = EffectSchedule::new();
    let mut order = 0usize;

    commit_deletions(tree, &reconciled.deletions, &mut schedule);

    for child in tree.children_of(root) {
        render_fiber(tree, child, &com, Arc::clone(&queue), &mut structure, &mut schedule, None, &mut order).await?;
    }

    commit_mounts(tree, root, &mut schedule);

    Ok((structure, schedule))
}

/// After a render failure anywhere in the pass, give every class-like
/// component still standing in the tree a chance to recover
/// (`spec.md` §7: `onError(com, state)` invoked across components,
/// in DFS order). Fibers whose render never reached `ClassComponent`
/// state (function components have no lifecycle hook for this) are
/// skipped. Recovery actions are returned in the same DFS order they
/// were collected, so a caller applying `modifications` in order
/// matches the spec's "modifications run in DFS order" rule.
pub fn fire_on_error(tree: &mut FiberTree, root: FiberId, com: &dyn Com, error: &RenderError) -> Vec<RecoveryAction> {
    let mut actions = Vec::new();
    for fiber in tree.dfs_pre_order(root) {
        if let Some(node) = tree.get_mut(fiber) {
            if let Some(state_node) = node.state_node.as_mut() {
                if let Some(action) = state_node.on_error(com, error) {
                    actions.push(action);
                }
            }
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, FunctionComponent};
    use async_trait::async_trait;

    struct NullCom;
    impl Com for NullCom {
        fn get_state(&self, _key: &str) -> Option<Value> {
            None
        }
        fn set_state(&self, _key: &str, _value: Value) -> Option<Value> {
            None
        }
        fn subscribe_state(&self, _key: &str, _listener: Box<dyn Fn(&Value) + Send + Sync>) -> u64 {
            0
        }
        fn unsubscribe_state(&self, _key: &str, _subscription: u64) {}
        fn remove_state(&self, _key: &str) {}
        fn request_recompile(&self, _reason: Option<String>) {}
    }

    struct Static(Vec<Node>);

    #[async_trait]
    impl FunctionComponent for Static {
        fn name(&self) -> &str {
            "Static"
        }

        async fn render(&self, _props: &Value, _cx: &mut RenderCx<'_>) -> Result<Vec<Node>, RenderError> {
            Ok(self.0.iter().map(|_| Node::Text("x".into())).collect())
        }
    }

    #[tokio::test]
    async fn single_section_produces_consolidated_structure() {
        let mut tree = FiberTree::new();
        let com: Arc<dyn Com> = Arc::new(NullCom);
        let queue = Arc::new(UpdateQueue::new());

        let section = Element::intrinsic(IntrinsicTag::Section, serde_json::json!({"id": "a", "title": "A"}));
        let root = Element::fragment(vec![Node::Element(section)]);

        let (structure, _schedule) = render_and_commit(&mut tree, root, Arc::clone(&com), Arc::clone(&queue)).await.unwrap();
        assert_eq!(structure.sections.len(), 1);
        assert_eq!(structure.system_message_items.len(), 1);
    }
}
