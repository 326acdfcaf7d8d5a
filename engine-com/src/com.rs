//! The Context Object Model itself: the mutable, per-execution store
//! that components build up each tick (`spec.md` §3/§4.4).
//!
//! Every operation takes `&self`: components render concurrently with
//! effects and with the reconciler's own bookkeeping, so the whole
//! store lives behind one [`Mutex`] rather than fine-grained locks per
//! field, mirroring the teacher's `MemoryStore` (`neuron-state-memory`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use engine_fiber::hook::Com as ComHooks;
use engine_model::{ModelAdapter, ModelOptions};
use engine_tool::{Tool, ToolRegistry};
use engine_types::{ContentBlock, FiberId, Message, RefName, SectionId, Visibility};
use serde_json::Value;

use crate::control::{ControlRequest, ControlStatus};
use crate::ephemeral::{coalesce_text, EphemeralEntry};
use crate::error::ComError;
use crate::events::{ComEvent, EventBus};
use crate::section::Section;
use crate::timeline::TimelineEntry;

/// Everything `clear()` resets. Grouped so `clear()` can swap it out
/// wholesale instead of field-by-field.
struct Cleared {
    timeline: Vec<TimelineEntry>,
    sections: HashMap<String, Section>,
    tools: ToolRegistry,
    ephemeral: Vec<EphemeralEntry>,
    system_messages: Vec<Message>,
    metadata: serde_json::Map<String, Value>,
    control_requests: Vec<ControlRequest>,
}

impl Default for Cleared {
    fn default() -> Self {
        Self {
            timeline: Vec::new(),
            sections: HashMap::new(),
            tools: ToolRegistry::new(),
            ephemeral: Vec::new(),
            system_messages: Vec::new(),
            metadata: serde_json::Map::new(),
            control_requests: Vec::new(),
        }
    }
}

/// Everything `clear()` leaves untouched: refs, shared `state`, and
/// the event bus's listeners (`spec.md` §8's `clear()` invariant).
struct Persistent {
    refs: HashMap<RefName, FiberId>,
    state: HashMap<String, Value>,
    subscriptions: HashMap<String, Vec<(u64, Box<dyn Fn(&Value) + Send + Sync>)>>,
    next_subscription_id: u64,
}

impl Default for Persistent {
    fn default() -> Self {
        Self {
            refs: HashMap::new(),
            state: HashMap::new(),
            subscriptions: HashMap::new(),
            next_subscription_id: 0,
        }
    }
}

struct Inner {
    cleared: Cleared,
    persistent: Persistent,
    model: Option<Arc<dyn ModelAdapter>>,
    model_options: Option<ModelOptions>,
    queued_messages: Vec<Message>,
    should_abort: bool,
    abort_reason: Option<String>,
    recompile_requested: Option<String>,
}

/// The Context Object Model: the semantic state a tree of components
/// mutates each tick, and the seam through which the reconciler's hook
/// runtime reads/writes shared `state` (via [`ComHooks`]).
pub struct ContextObjectModel {
    inner: Mutex<Inner>,
    events: EventBus,
}

impl Default for ContextObjectModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextObjectModel {
    /// An empty COM with no model configured.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                cleared: Cleared::default(),
                persistent: Persistent::default(),
                model: None,
                model_options: None,
                queued_messages: Vec::new(),
                should_abort: false,
                abort_reason: None,
                recompile_requested: None,
            }),
            events: EventBus::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("COM mutex poisoned")
    }

    /// Register a process-lifetime event listener. Survives `clear()`.
    pub fn subscribe(&self, listener: Box<dyn Fn(&ComEvent) + Send + Sync>) {
        self.events.subscribe(listener);
    }

    /// Append a message. Messages with `role == system` route
    /// exclusively to the `systemMessages` buffer, never the timeline,
    /// per `spec.md` §9's resolution of the system-message ambiguity.
    pub fn add_message(&self, message: Message) {
        let is_system = message.role == engine_types::Role::System;
        {
            let mut inner = self.lock();
            if is_system {
                inner.cleared.system_messages.push(message);
            } else {
                inner.cleared.timeline.push(TimelineEntry::message(message));
            }
        }
        self.events.emit(ComEvent::MessageAdded { is_system });
        if !is_system {
            self.events.emit(ComEvent::TimelineModified);
        }
    }

    /// Append a raw timeline entry (message or event kind).
    pub fn add_timeline_entry(&self, entry: TimelineEntry) {
        self.lock().cleared.timeline.push(entry);
        self.events.emit(ComEvent::TimelineModified);
    }

    /// Add or merge a section by id, per the §4.3 content-combination
    /// rule. Returns the section's id.
    pub fn add_section(&self, section: Section) -> SectionId {
        let id = section.id.clone();
        let created = {
            let mut inner = self.lock();
            match inner.cleared.sections.get_mut(id.as_str()) {
                Some(existing) => {
                    existing.merge(section);
                    false
                }
                None => {
                    inner.cleared.sections.insert(id.as_str().to_string(), section);
                    true
                }
            }
        };
        self.events.emit(ComEvent::SectionUpdated { id: id.clone(), created });
        id
    }

    /// Register a tool. Silent no-op if its name is empty.
    pub fn add_tool(&self, tool: Arc<dyn Tool>) {
        let name = tool.metadata().name.clone();
        if name.is_empty() {
            return;
        }
        self.lock().cleared.tools.register(tool);
        self.events.emit(ComEvent::ToolRegistered { name });
    }

    /// Remove a tool by name. Emits `tool:removed` only if it was present.
    pub fn remove_tool(&self, name: &str) {
        let removed = self.lock().cleared.tools.remove(name);
        if removed {
            self.events.emit(ComEvent::ToolRemoved { name: name.to_string() });
        }
    }

    /// All currently-registered tools.
    pub fn tools(&self) -> ToolRegistry {
        self.lock().cleared.tools.clone()
    }

    /// Write a shared-state key, emitting `state:changed` with the
    /// previous value. Returns the previous value, if any.
    pub fn set_state(&self, key: &str, value: Value) -> Option<Value> {
        let previous = {
            let mut inner = self.lock();
            inner.persistent.state.insert(key.to_string(), value.clone())
        };
        self.notify_state(key, &value);
        self.events.emit(ComEvent::StateChanged { key: key.to_string(), value, previous: previous.clone() });
        previous
    }

    /// Write several shared-state keys at once, as `set_state` applied
    /// key-by-key in iteration order.
    pub fn set_state_partial(&self, values: serde_json::Map<String, Value>) {
        for (key, value) in values {
            self.set_state(&key, value);
        }
    }

    /// Read a shared-state key.
    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.lock().persistent.state.get(key).cloned()
    }

    /// Remove a shared-state key, e.g. when the hook that owns it
    /// unmounts. No event is emitted: absence is not itself a change
    /// another component's `useWatch` needs to react to.
    pub fn remove_state(&self, key: &str) {
        self.lock().persistent.state.remove(key);
    }

    fn notify_state(&self, key: &str, value: &Value) {
        let inner = self.lock();
        if let Some(subs) = inner.persistent.subscriptions.get(key) {
            for (_, listener) in subs {
                listener(value);
            }
        }
    }

    /// Attach free-form metadata. Emits `metadata:changed`.
    pub fn add_metadata(&self, key: &str, value: Value) {
        self.lock().cleared.metadata.insert(key.to_string(), value.clone());
        self.events.emit(ComEvent::MetadataChanged { key: key.to_string(), value });
    }

    /// All metadata accumulated so far this tick.
    pub fn metadata(&self) -> serde_json::Map<String, Value> {
        self.lock().cleared.metadata.clone()
    }

    /// Set the active model adapter. Emits `model:changed`.
    pub fn set_model(&self, model: Arc<dyn ModelAdapter>, options: Option<ModelOptions>) {
        let id = model.metadata().id.clone();
        {
            let mut inner = self.lock();
            inner.model = Some(model);
            inner.model_options = options;
        }
        self.events.emit(ComEvent::ModelChanged { model: id });
    }

    /// Clear the active model adapter. Emits `model:unset`.
    pub fn unset_model(&self) {
        {
            let mut inner = self.lock();
            inner.model = None;
            inner.model_options = None;
        }
        self.events.emit(ComEvent::ModelUnset);
    }

    /// The active model adapter, if any.
    pub fn model(&self) -> Option<Arc<dyn ModelAdapter>> {
        self.lock().model.clone()
    }

    /// The active model's options, if any.
    pub fn model_options(&self) -> Option<ModelOptions> {
        self.lock().model_options.clone()
    }

    /// Look up the configured model, failing if none is set — used by
    /// the orchestrator at the Model phase boundary.
    pub fn require_model(&self) -> Result<Arc<dyn ModelAdapter>, ComError> {
        self.model().ok_or(ComError::NoModelConfigured)
    }

    /// Append an ephemeral entry. Contiguous text blocks within
    /// `content` are coalesced per §4.3 step 4. Never emits an event:
    /// ephemeral state is cleared every tick and not independently
    /// observable.
    pub fn add_ephemeral(&self, mut entry: EphemeralEntry) {
        entry.content = coalesce_text(std::mem::take(&mut entry.content));
        self.lock().cleared.ephemeral.push(entry);
    }

    /// All ephemeral entries accumulated this tick, in insertion order.
    pub fn ephemeral(&self) -> Vec<EphemeralEntry> {
        self.lock().cleared.ephemeral.clone()
    }

    /// The timeline so far this tick.
    pub fn timeline(&self) -> Vec<TimelineEntry> {
        self.lock().cleared.timeline.clone()
    }

    /// The system-message buffer so far this tick.
    pub fn system_messages(&self) -> Vec<Message> {
        self.lock().cleared.system_messages.clone()
    }

    /// All sections, keyed by id string.
    pub fn sections(&self) -> HashMap<String, Section> {
        self.lock().cleared.sections.clone()
    }

    /// Reset `timeline`, `sections`, `tools`, `ephemeral`,
    /// `systemMessages`, `metadata`, and `controlRequests`. Leaves
    /// `refs`, shared `state`, and event listeners untouched.
    /// Re-registers are the orchestrator's responsibility, run right
    /// after this call at the start of each tick's Starting phase.
    pub fn clear(&self) {
        self.lock().cleared = Cleared::default();
        self.events.emit(ComEvent::StateCleared);
    }

    /// Record a tick-control request; resolved at tick end via
    /// [`crate::control::resolve`].
    pub fn request_stop(&self, request: ControlRequest) {
        self.lock().cleared.control_requests.push(request);
    }

    /// Record a `continue` request, overriding a non-continue default.
    pub fn request_continue(&self, priority: i32) {
        self.lock().cleared.control_requests.push(ControlRequest::continue_(priority));
    }

    /// Drain and resolve this tick's control requests against a
    /// default status.
    pub fn resolve_control(&self, default: ControlStatus) -> ControlStatus {
        let requests = std::mem::take(&mut self.lock().cleared.control_requests);
        crate::control::resolve(&requests, default)
    }

    /// Request another compile iteration this tick; read (and reset)
    /// by the compile loop between iterations.
    pub fn request_recompile(&self, reason: Option<String>) {
        self.lock().recompile_requested = Some(reason.unwrap_or_default());
    }

    /// Take the pending recompile request, if any, clearing it.
    pub fn take_recompile_request(&self) -> Option<String> {
        self.lock().recompile_requested.take()
    }

    /// Set the abort flag and reason. Checked at phase boundaries by
    /// the orchestrator.
    pub fn abort(&self, reason: Option<String>) {
        let mut inner = self.lock();
        inner.should_abort = true;
        inner.abort_reason = reason;
    }

    /// Whether `abort` has been called this execution.
    pub fn should_abort(&self) -> bool {
        self.lock().should_abort
    }

    /// The reason passed to `abort`, if any.
    pub fn abort_reason(&self) -> Option<String> {
        self.lock().abort_reason.clone()
    }

    /// Queue a message for delivery at the start of the next tick.
    /// Called by the orchestrator when a message arrives mid-tick.
    pub fn queue_message(&self, message: Message) {
        self.lock().queued_messages.push(message);
        self.events.emit(ComEvent::ExecutionMessage);
    }

    /// Drain the queued-message buffer; the orchestrator snapshots
    /// this into the next tick's `tickState.queuedMessages`.
    pub fn take_queued_messages(&self) -> Vec<Message> {
        std::mem::take(&mut self.lock().queued_messages)
    }

    /// Replace the ref table wholesale with the fibers live after the
    /// most recent commit (`engine-render` calls this once per
    /// compile iteration, via [`engine_fiber::FiberTree::refs`]).
    pub fn set_refs(&self, refs: Vec<(RefName, FiberId)>) {
        self.lock().persistent.refs = refs.into_iter().collect();
    }

    /// Resolve a `ref` name to its fiber id, if mounted.
    pub fn get_ref(&self, name: &RefName) -> Option<FiberId> {
        self.lock().persistent.refs.get(name).copied()
    }

    /// Coalesce ephemeral, timeline, and system-message content
    /// blocks, all pre-flattened to text, for convenience callers
    /// (tests, simple renderers) that don't need structured access.
    pub fn system_message_text(&self) -> String {
        self.system_messages().iter().map(|m| m.text_content()).collect::<Vec<_>>().join("\n\n")
    }
}

impl ComHooks for ContextObjectModel {
    fn get_state(&self, key: &str) -> Option<Value> {
        ContextObjectModel::get_state(self, key)
    }

    fn set_state(&self, key: &str, value: Value) -> Option<Value> {
        ContextObjectModel::set_state(self, key, value)
    }

    fn subscribe_state(&self, key: &str, listener: Box<dyn Fn(&Value) + Send + Sync>) -> u64 {
        let mut inner = self.lock();
        let id = inner.persistent.next_subscription_id;
        inner.persistent.next_subscription_id += 1;
        inner.persistent.subscriptions.entry(key.to_string()).or_default().push((id, listener));
        id
    }

    fn unsubscribe_state(&self, key: &str, subscription: u64) {
        let mut inner = self.lock();
        if let Some(subs) = inner.persistent.subscriptions.get_mut(key) {
            subs.retain(|(id, _)| *id != subscription);
        }
    }

    fn remove_state(&self, key: &str) {
        ContextObjectModel::remove_state(self, key)
    }

    fn request_recompile(&self, reason: Option<String>) {
        ContextObjectModel::request_recompile(self, reason)
    }
}

/// Coalesce a sequence of content blocks emitted across one tick for
/// display, merging adjacent text runs.
pub fn coalesce_blocks(blocks: Vec<ContentBlock>) -> Vec<ContentBlock> {
    coalesce_text(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_types::Role;

    fn com() -> ContextObjectModel {
        ContextObjectModel::new()
    }

    #[test]
    fn system_role_message_routes_to_system_buffer_not_timeline() {
        let c = com();
        c.add_message(Message::new(Role::System, vec![ContentBlock::text("be concise")]));
        assert!(c.timeline().is_empty());
        assert_eq!(c.system_messages().len(), 1);
    }

    #[test]
    fn user_role_message_routes_to_timeline() {
        let c = com();
        c.add_message(Message::new(Role::User, vec![ContentBlock::text("hi")]));
        assert_eq!(c.timeline().len(), 1);
        assert!(c.system_messages().is_empty());
    }

    #[test]
    fn clear_resets_cleared_state_but_preserves_refs_and_shared_state() {
        let c = com();
        c.set_state("k", Value::from(1));
        c.set_refs(vec![(RefName::from("r"), FiberId(7))]);
        c.add_message(Message::new(Role::User, vec![ContentBlock::text("hi")]));
        c.add_metadata("m", Value::from(true));

        c.clear();

        assert!(c.timeline().is_empty());
        assert!(c.metadata().is_empty());
        assert_eq!(c.get_state("k"), Some(Value::from(1)));
        assert_eq!(c.get_ref(&RefName::from("r")), Some(FiberId(7)));
    }

    #[test]
    fn set_state_emits_changed_with_previous_value() {
        let c = com();
        let seen: Arc<Mutex<Vec<(Option<Value>, Value)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        c.subscribe(Box::new(move |e| {
            if let ComEvent::StateChanged { value, previous, .. } = e {
                seen2.lock().unwrap().push((previous.clone(), value.clone()));
            }
        }));
        c.set_state("k", Value::from(1));
        c.set_state("k", Value::from(2));
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![(None, Value::from(1)), (Some(Value::from(1)), Value::from(2))]);
    }

    #[test]
    fn add_section_twice_merges_into_one() {
        let c = com();
        let id = SectionId::from("notes");
        c.add_section(Section {
            id: id.clone(),
            title: Some("Notes".into()),
            content: engine_fiber::SectionContent::Text("first".into()),
            visibility: Visibility::Model,
            tags: vec![],
            metadata: Value::Null,
            formatted: None,
            rendered_by: None,
        });
        c.add_section(Section {
            id: id.clone(),
            title: Some("Notes".into()),
            content: engine_fiber::SectionContent::Text("second".into()),
            visibility: Visibility::Model,
            tags: vec![],
            metadata: Value::Null,
            formatted: None,
            rendered_by: None,
        });
        assert_eq!(c.sections().len(), 1);
    }

    #[test]
    fn removing_a_tool_twice_only_emits_once() {
        use engine_tool::ToolMetadata;
        use std::future::Future;
        use std::pin::Pin;

        struct Echo(ToolMetadata);
        impl Tool for Echo {
            fn metadata(&self) -> &ToolMetadata {
                &self.0
            }
            fn run(&self, input: Value) -> Pin<Box<dyn Future<Output = Result<Vec<ContentBlock>, engine_tool::ToolError>> + Send + '_>> {
                Box::pin(async move { Ok(vec![ContentBlock::Json { value: input }]) })
            }
        }

        let c = com();
        let removed_count = Arc::new(Mutex::new(0usize));
        let removed_count2 = Arc::clone(&removed_count);
        c.subscribe(Box::new(move |e| {
            if let ComEvent::ToolRemoved { .. } = e {
                *removed_count2.lock().unwrap() += 1;
            }
        }));
        c.add_tool(Arc::new(Echo(ToolMetadata::new("t", "desc", Value::Null))));
        c.remove_tool("t");
        c.remove_tool("t");
        assert_eq!(*removed_count.lock().unwrap(), 1);
    }
}
