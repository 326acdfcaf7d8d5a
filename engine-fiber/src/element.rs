//! Elements — the plain-value tree shape components produce.
//!
//! A JSX-style literal tree is foreign to Rust; per the design notes
//! an element is just a plain value of `{type, props, children, key,
//! ref}` shape, and anything that builds that shape (here: a builder
//! function or a struct literal) is a valid frontend.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use engine_types::{ContentBlock, RefName};
use serde_json::Value;

use crate::error::RenderError;
use crate::hook::{Com, RenderCx};

/// What a component's [`ClassComponent::on_error`] asks the
/// compile-stabilization loop to do about a render failure
/// (`spec.md` §7). `None` (no recovery) propagates the error as-is.
pub struct RecoveryAction {
    /// If `true`, the failing tick proceeds instead of surfacing the
    /// error to the caller.
    pub continue_tick: bool,
    /// Appended as a single `event`-role timeline entry when recovery
    /// is applied.
    pub recovery_message: Option<String>,
    /// Arbitrary COM mutation to run as part of recovery, in the same
    /// DFS order the owning component was visited in.
    pub modifications: Option<Box<dyn FnOnce(&dyn Com) + Send>>,
}

impl RecoveryAction {
    /// Ask the loop to continue, optionally leaving a breadcrumb in
    /// the timeline.
    pub fn continue_with(recovery_message: impl Into<Option<String>>) -> Self {
        Self { continue_tick: true, recovery_message: recovery_message.into(), modifications: None }
    }

    /// Attach a COM mutation to run if this recovery is applied.
    pub fn with_modifications(mut self, modifications: impl FnOnce(&dyn Com) + Send + 'static) -> Self {
        self.modifications = Some(Box::new(modifications));
        self
    }
}

impl fmt::Debug for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryAction")
            .field("continue_tick", &self.continue_tick)
            .field("recovery_message", &self.recovery_message)
            .field("has_modifications", &self.modifications.is_some())
            .finish()
    }
}

/// Built-in tags recognized directly by the reconciler. These never
/// reach a user render function; the reconciler appends them to the
/// in-progress [`crate::structure::CompiledStructure`] instead.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicTag {
    /// A named, possibly-titled piece of context folded into the
    /// consolidated system message.
    Section,
    /// A timeline message (user/assistant/tool/event).
    Message,
    /// Marks the position of the rendered timeline within the tree.
    Timeline,
    /// Registers an executable tool.
    Tool,
    /// A one-tick scratch entry cleared at the start of the next tick.
    Ephemeral,
    /// Selects the active model adapter.
    Model,
    /// Sets generation parameters for the active model.
    ModelOptions,
    /// Declares a child execution that inherits and merges the
    /// parent's abort signal.
    Fork,
    /// Declares a child execution independent of the parent's abort
    /// signal.
    Spawn,
    /// Marks the execution as finished once committed.
    Complete,
    /// Sets the inherited rendering mode for descendants.
    Renderer,
}

impl IntrinsicTag {
    /// Stable name used in diagnostics and debug output.
    pub fn name(&self) -> &'static str {
        match self {
            IntrinsicTag::Section => "Section",
            IntrinsicTag::Message => "Message",
            IntrinsicTag::Timeline => "Timeline",
            IntrinsicTag::Tool => "Tool",
            IntrinsicTag::Ephemeral => "Ephemeral",
            IntrinsicTag::Model => "Model",
            IntrinsicTag::ModelOptions => "ModelOptions",
            IntrinsicTag::Fork => "Fork",
            IntrinsicTag::Spawn => "Spawn",
            IntrinsicTag::Complete => "Complete",
            IntrinsicTag::Renderer => "Renderer",
        }
    }
}

/// A function-style component: a plain function from `(props, render
/// context)` to a child list. Hooks called inside `render` bind to
/// the fiber the reconciler is currently rendering.
#[async_trait]
pub trait FunctionComponent: Send + Sync {
    /// Name used in diagnostics (`RenderError::ComponentFailed`, hook
    /// order violations, tracing spans).
    fn name(&self) -> &str;

    /// Render this component for the given props.
    async fn render(&self, props: &Value, cx: &mut RenderCx<'_>) -> Result<Vec<Node>, RenderError>;
}

/// Per-instance state for a class-like component. Constructed once on
/// mount (`ClassComponentFactory::create`), then reused across ticks:
/// `set_props` replaces its props in place and `render` is called
/// again, mirroring `new type(props)` then `stateNode.render(...)`.
#[async_trait]
pub trait ClassComponent: Send + Sync {
    /// Replace this instance's current props ahead of a render.
    fn set_props(&mut self, props: &Value);

    /// Render this instance for its current props.
    async fn render(&mut self, cx: &mut RenderCx<'_>) -> Result<Vec<Node>, RenderError>;

    /// Called once after this instance's first commit.
    fn on_mount(&mut self) {}

    /// Called once before this instance is detached.
    fn on_unmount(&mut self) {}

    /// Called when a render anywhere in this tick's pass failed
    /// (`spec.md` §7). Returning `Some(action)` with `continue_tick:
    /// true` lets the tick proceed instead of surfacing the error;
    /// the default declines recovery.
    fn on_error(&mut self, _com: &dyn Com, _error: &RenderError) -> Option<RecoveryAction> {
        None
    }
}

/// Constructs fresh [`ClassComponent`] instances for a class-like
/// element type.
pub trait ClassComponentFactory: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Construct a new instance for the given initial props.
    fn create(&self, props: &Value) -> Box<dyn ClassComponent>;
}

/// The identity of an [`Element`]: what the reconciler's type-equality
/// check (`old.type === new.type`) compares.
#[derive(Clone)]
pub enum ElementType {
    /// A built-in tag handled directly by the reconciler.
    Intrinsic(IntrinsicTag),
    /// A user function component.
    Function(Arc<dyn FunctionComponent>),
    /// A user class-like component.
    Class(Arc<dyn ClassComponentFactory>),
    /// Contributes no fiber of its own; its children are inlined at
    /// its position.
    Fragment,
}

impl ElementType {
    fn type_name(&self) -> &str {
        match self {
            ElementType::Intrinsic(tag) => tag.name(),
            ElementType::Function(f) => f.name(),
            ElementType::Class(c) => c.name(),
            ElementType::Fragment => "Fragment",
        }
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementType({})", self.type_name())
    }
}

impl PartialEq for ElementType {
    /// Type equality per the reconciliation algorithm: intrinsics and
    /// fragments compare by tag; function/class components compare by
    /// pointer identity of their `Arc` (the same registered component
    /// definition, not merely the same name).
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ElementType::Intrinsic(a), ElementType::Intrinsic(b)) => a == b,
            (ElementType::Function(a), ElementType::Function(b)) => Arc::ptr_eq(a, b),
            (ElementType::Class(a), ElementType::Class(b)) => Arc::ptr_eq(a, b),
            (ElementType::Fragment, ElementType::Fragment) => true,
            _ => false,
        }
    }
}

/// A node in a component's returned child list, before reconciliation.
/// Primitives (`&str`, `String`) coerce to text content; `bool`/`None`
/// drop silently; nested lists flatten to arbitrary depth.
pub enum Node {
    /// A child element to reconcile.
    Element(Element),
    /// A primitive string, coerced to a text content block.
    Text(String),
    /// A native content block (image, audio, code, ...) passed through.
    Block(ContentBlock),
    /// A nested list, flattened into its parent's child list.
    List(Vec<Node>),
    /// A dropped child (from `bool`/`None`/`null`/`undefined`).
    Empty,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Element(e) => write!(f, "Element({:?})", e.ty),
            Node::Text(t) => write!(f, "Text({t:?})"),
            Node::Block(_) => write!(f, "Block(..)"),
            Node::List(items) => write!(f, "List({} items)", items.len()),
            Node::Empty => write!(f, "Empty"),
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Text(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::Text(value)
    }
}

impl From<ContentBlock> for Node {
    fn from(value: ContentBlock) -> Self {
        Node::Block(value)
    }
}

impl From<Element> for Node {
    fn from(value: Element) -> Self {
        Node::Element(value)
    }
}

impl From<Vec<Node>> for Node {
    fn from(value: Vec<Node>) -> Self {
        Node::List(value)
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Node::Empty,
        }
    }
}

/// Flatten a child list to arbitrary depth, dropping `Empty` nodes.
/// This is the normalization rule applied to every element's children
/// before reconciliation.
pub fn flatten(nodes: Vec<Node>) -> Vec<Node> {
    fn go(node: Node, out: &mut Vec<Node>) {
        match node {
            Node::List(items) => {
                for item in items {
                    go(item, out);
                }
            }
            Node::Empty => {}
            other => out.push(other),
        }
    }
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        go(node, &mut out);
    }
    out
}

/// A single element in the tree a component produced: `{type, props,
/// children, key, ref}`.
pub struct Element {
    /// Identity compared during reconciliation.
    pub ty: ElementType,
    /// Reconciliation key, scoped to this element's sibling list.
    pub key: Option<String>,
    /// Name this fiber publishes to the COM ref table, if any.
    pub ref_name: Option<RefName>,
    /// Free-form props, as a JSON object.
    pub props: Value,
    /// This element's (already-flattened) children.
    pub children: Vec<Node>,
}

impl Element {
    /// Build an element, flattening and normalizing its children.
    pub fn new(ty: ElementType, props: Value, children: Vec<Node>) -> Self {
        Self {
            ty,
            key: None,
            ref_name: None,
            props,
            children: flatten(children),
        }
    }

    /// Set this element's reconciliation key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the ref name this fiber publishes to the COM ref table.
    pub fn with_ref(mut self, name: RefName) -> Self {
        self.ref_name = Some(name);
        self
    }

    /// An intrinsic element with no children.
    pub fn intrinsic(tag: IntrinsicTag, props: Value) -> Self {
        Self::new(ElementType::Intrinsic(tag), props, Vec::new())
    }

    /// A fragment grouping children without contributing a fiber.
    pub fn fragment(children: Vec<Node>) -> Self {
        Self::new(ElementType::Fragment, Value::Null, children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_lists_flatten_to_arbitrary_depth() {
        let nodes = vec![
            Node::from("a"),
            Node::List(vec![
                Node::from("b"),
                Node::List(vec![Node::from("c"), Node::Empty, Node::from("d")]),
            ]),
        ];
        let flat = flatten(nodes);
        assert_eq!(flat.len(), 4);
    }

    #[test]
    fn bool_and_none_drop_silently() {
        let nodes: Vec<Node> = vec![None::<Node>.into(), Node::from("kept")];
        let flat = flatten(nodes);
        assert_eq!(flat.len(), 1);
    }

    #[test]
    fn intrinsic_type_equality_is_by_tag() {
        assert_eq!(ElementType::Intrinsic(IntrinsicTag::Section), ElementType::Intrinsic(IntrinsicTag::Section));
        assert_ne!(ElementType::Intrinsic(IntrinsicTag::Section), ElementType::Intrinsic(IntrinsicTag::Message));
    }
}
