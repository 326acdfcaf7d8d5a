//! The tick orchestrator: drives one execution through
//! Starting -> Compiling -> Awaiting-Forks -> Applying -> Model ->
//! Tools -> Ingesting -> Ended (`spec.md` §4.5), and owns fork/spawn/
//! signal/kill against the shared [`ExecutionGraph`] (§4.6).
//!
//! Grounded in the teacher's `LocalOrch` (`neuron-orch-local`): a
//! thin struct holding shared dispatch state, `tokio::spawn` for
//! concurrent fan-out (tool calls here, instead of agent dispatch),
//! and `async_trait`-free plain async methods on `&mut self` since
//! unlike `LocalOrch` this orchestrator owns one execution's mutable
//! tree rather than routing between independent operators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use engine_com::{ContextObjectModel, ControlStatus, Section, TickState, TimelineEntry};
use engine_fiber::{
    fire_on_error, fire_phase_over_tree, render_and_commit, Element, EffectPhase, EffectSchedule, FiberTree,
    RenderError, UpdateQueue,
};
use engine_model::{ModelAdapter, StopReason, ToolCallRequest};
use engine_render::{apply_structure, Resolver};
use engine_tool::{ClientToolCoordinator, ConfirmationCoordinator, ExecutionType, ToolRegistry};
use engine_types::{
    ContentBlock, DurationMs, Message, Pid, Role, StreamEvent, StreamEventIdAllocator, StreamEventKind, TraceId,
    Visibility,
};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::config::SessionConfig;
use crate::error::OrchestratorError;
use crate::fork::{ForkOptions, InheritMode, SpawnOptions, TraceInherit};
use crate::graph::ExecutionGraph;
use crate::handle::{ExecutionHandle, ExecutionKind, ExecutionStatus};
use crate::lifecycle::{LifecycleListener, LifecycleNotice};

/// Builds the root element to render for one compile iteration, given
/// the current tick's state. The orchestrator rebuilds this fresh
/// every `compileUntilStable` iteration rather than threading tick
/// state through `RenderCx` itself — tick state becomes an ordinary
/// prop on the root element like any other, leaving `engine-fiber`'s
/// already-settled render signature untouched.
pub trait RootComponent: Send + Sync {
    /// Build this tick's root element.
    fn build(&self, tick: &TickState) -> Element;
}

/// Point-in-time record handed to an injected [`Persistence`]
/// implementation (`spec.md` §6's persistence hooks: out of scope to
/// implement a backend, but the seam is part of the ambient stack).
#[derive(Debug, Clone)]
pub struct ExecutionSnapshot {
    /// The execution this snapshot describes.
    pub pid: Pid,
    /// Current status.
    pub status: ExecutionStatus,
    /// Tick number this snapshot was taken at.
    pub tick: u64,
}

/// Host-supplied persistence hooks. No concrete backend ships here
/// (`spec.md` §1 Non-goals) — only the seam the orchestrator calls at
/// tick boundaries.
pub trait Persistence: Send + Sync {
    /// Persist a snapshot of this execution's progress.
    fn save(&self, snapshot: ExecutionSnapshot);
}

/// One running execution's tick state machine.
pub struct Session {
    handle: Arc<ExecutionHandle>,
    graph: Arc<ExecutionGraph>,
    tree: FiberTree,
    queue: Arc<UpdateQueue>,
    config: SessionConfig,
    root: Arc<dyn RootComponent>,
    resolver: Arc<dyn Resolver>,
    renderers: Arc<engine_render::RendererRegistry>,
    confirmations: Arc<ConfirmationCoordinator>,
    client_tools: Arc<ClientToolCoordinator>,
    lifecycle: Option<LifecycleListener>,
    persistence: Option<Arc<dyn Persistence>>,
    tick_state: TickState,
    cumulative_tokens: u64,
    stream_ids: Arc<StreamEventIdAllocator>,
    stream_sink: Option<UnboundedSender<StreamEvent>>,
    started_at: std::time::Instant,
}

impl Session {
    /// Start a brand-new root execution.
    pub fn new(root: Arc<dyn RootComponent>, resolver: Arc<dyn Resolver>, config: SessionConfig) -> Self {
        let graph = Arc::new(ExecutionGraph::new());
        let pid = graph.next_pid();
        let com = Arc::new(ContextObjectModel::new());
        let handle = Arc::new(ExecutionHandle::root(pid, TraceId::generate(), com));
        graph.register(Arc::clone(&handle));
        Self {
            handle,
            graph,
            tree: FiberTree::new(),
            queue: Arc::new(UpdateQueue::new()),
            config,
            root,
            resolver,
            renderers: Arc::new(engine_render::RendererRegistry::new()),
            confirmations: Arc::new(ConfirmationCoordinator::new()),
            client_tools: Arc::new(ClientToolCoordinator::new()),
            lifecycle: None,
            persistence: None,
            tick_state: TickState::first(Value::Null),
            cumulative_tokens: 0,
            stream_ids: Arc::new(StreamEventIdAllocator::new()),
            stream_sink: None,
            started_at: std::time::Instant::now(),
        }
    }

    /// Builder: install a non-default renderer registry.
    pub fn with_renderers(mut self, renderers: engine_render::RendererRegistry) -> Self {
        self.renderers = Arc::new(renderers);
        self
    }

    /// Builder: install a lifecycle-notice listener.
    pub fn with_lifecycle_listener(mut self, listener: LifecycleListener) -> Self {
        self.lifecycle = Some(listener);
        self
    }

    /// Builder: install a persistence hook.
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// This execution's pid.
    pub fn pid(&self) -> Pid {
        self.handle.pid()
    }

    /// This execution's handle.
    pub fn handle(&self) -> &Arc<ExecutionHandle> {
        &self.handle
    }

    /// This execution's Context Object Model.
    pub fn com(&self) -> &Arc<ContextObjectModel> {
        self.handle.com()
    }

    /// The shared execution graph this session's forks/spawns register into.
    pub fn graph(&self) -> &Arc<ExecutionGraph> {
        &self.graph
    }

    /// The tool-confirmation rendezvous coordinator, so a host can
    /// resolve a pending confirmation from outside the tick loop
    /// (`spec.md` §4.7).
    pub fn confirmations(&self) -> &Arc<ConfirmationCoordinator> {
        &self.confirmations
    }

    /// The client-executed-tool rendezvous coordinator, so a host can
    /// deliver an externally-produced tool result (`spec.md` §4.7).
    pub fn client_tools(&self) -> &Arc<ClientToolCoordinator> {
        &self.client_tools
    }

    fn elapsed(&self) -> DurationMs {
        DurationMs::from(self.started_at.elapsed())
    }

    fn emit_stream(&self, kind: StreamEventKind) {
        if let Some(sink) = &self.stream_sink {
            let event = StreamEvent::new(self.stream_ids.next(), self.tick_state.tick as u32, self.elapsed(), kind);
            let _ = sink.send(event);
        }
    }

    /// Run this execution to completion against `user_input`,
    /// ticking until a tick resolves to anything but `continue`, an
    /// abort is observed, or `max_ticks` is reached.
    pub async fn execute(&mut self, user_input: Value) -> Result<TickState, OrchestratorError> {
        self.tick_state = TickState::first(user_input);
        self.emit_stream(StreamEventKind::ExecutionStart { pid: self.pid() });

        let final_status = loop {
            if self.handle.is_cancelled() || self.com().should_abort() {
                break ControlStatus::Aborted;
            }
            if self.tick_state.tick > self.config.max_ticks {
                break ControlStatus::Completed;
            }

            let status = match self.run_one_tick().await {
                Ok(status) => status,
                Err(err) => {
                    self.emit_stream(StreamEventKind::EngineError { message: err.to_string() });
                    self.handle.set_status(ExecutionStatus::Failed);
                    return Err(err);
                }
            };

            if let Some(persistence) = &self.persistence {
                persistence.save(ExecutionSnapshot { pid: self.pid(), status: self.handle.status(), tick: self.tick_state.tick });
            }

            if status != ControlStatus::Continue {
                break status;
            }
        };

        self.handle.set_status(match final_status {
            ControlStatus::Aborted => ExecutionStatus::Cancelled,
            _ => ExecutionStatus::Completed,
        });
        self.emit_stream(StreamEventKind::ExecutionEnd { status: format!("{final_status:?}") });
        Ok(self.tick_state.clone())
    }

    /// Run `execute` on a background task, returning a receiver of
    /// its streamed lifecycle events alongside the task's join handle
    /// (`spec.md` §4.5/§6's streaming entry point).
    pub fn stream(
        mut self,
        user_input: Value,
    ) -> (tokio::task::JoinHandle<Result<TickState, OrchestratorError>>, tokio::sync::mpsc::UnboundedReceiver<StreamEvent>)
    where
        Self: Send + 'static,
    {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.stream_sink = Some(tx);
        let handle = tokio::spawn(async move { self.execute(user_input).await });
        (handle, rx)
    }

    async fn run_one_tick(&mut self) -> Result<ControlStatus, OrchestratorError> {
        self.emit_stream(StreamEventKind::TickStart);

        // Starting: reset this tick's cleared state and deliver any
        // messages queued during the previous tick.
        self.com().clear();
        let has_queued_messages = !self.tick_state.queued_messages.is_empty();

        // Compiling: render+reconcile+commit until stable or capped.
        let (structure, mut schedule, forced_stable) = self.compile_until_stable(has_queued_messages).await?;
        let _ = forced_stable;

        if self.handle.is_cancelled() || self.com().should_abort() {
            return Ok(ControlStatus::Aborted);
        }

        // Awaiting-Forks: a named checkpoint for forks this tick may
        // have created via the explicit `fork`/`spawn` API (never the
        // declarative tree — `Fork`/`Spawn` intrinsics are structure
        // no-ops, see `engine-fiber::commit`). This engine runs forks
        // concurrently in the background rather than blocking ticks
        // on them, so the checkpoint is currently a pass-through; it
        // exists so a future blocking policy has a phase to hook into.
        let _ = self.graph.outstanding_forks(self.pid());

        // Applying: the final stable structure is the only one applied.
        apply_structure(structure, self.com(), &self.renderers, self.resolver.as_ref());

        if self.com().should_abort() {
            return Ok(ControlStatus::Aborted);
        }

        // Model.
        let model = self.com().require_model()?;
        let formatted = build_formatted_input(self.com());
        self.check_context_pressure(&formatted);
        let native = model.from_engine_state(formatted.clone()).await?;
        let raw_output = model.generate(native).await?;
        let response = model.to_engine_state(raw_output).await?;

        if let Some(usage) = response.usage {
            self.cumulative_tokens += usage.input_tokens + usage.output_tokens;
            self.check_budget();
        }

        for entry in response.new_timeline_entries {
            self.com().add_timeline_entry(TimelineEntry::message(entry));
        }
        for (id, blocks) in response.updated_sections {
            self.com().add_section(Section {
                id,
                title: None,
                content: engine_fiber::SectionContent::Blocks(blocks),
                visibility: Visibility::Model,
                tags: Vec::new(),
                metadata: Value::Null,
                formatted: None,
                rendered_by: None,
            });
        }
        if response.should_stop {
            self.tick_state.stop(response.stop_reason.clone().unwrap_or(StopReason {
                reason: "model_requested_stop".into(),
                description: None,
            }));
        }

        // Tools.
        if !response.tool_calls.is_empty() || !response.executed_tool_results.is_empty() {
            self.run_tools(response.tool_calls, response.executed_tool_results).await?;
        }

        if self.com().should_abort() {
            return Ok(ControlStatus::Aborted);
        }

        // Ingesting: resolve tick control, fire TickEnd, advance tick state.
        let default_status =
            if self.tick_state.stop_reason.is_some() { ControlStatus::Completed } else { ControlStatus::Continue };
        let status = self.com().resolve_control(default_status);
        let status = if self.com().should_abort() { ControlStatus::Aborted } else { status };

        let root = self.tree.root().expect("root set during compiling");
        fire_phase_over_tree(&mut self.tree, root, &mut schedule, EffectPhase::TickEnd);

        let queued = self.com().take_queued_messages();
        self.tick_state = self.tick_state.next(formatted, queued);

        self.emit_stream(StreamEventKind::TickEnd { should_continue: status == ControlStatus::Continue });
        Ok(status)
    }

    /// The `compileUntilStable` loop: render+commit repeatedly until
    /// neither a recompile was requested nor any fiber holds a
    /// pending state update, firing `TickStart` (first iteration
    /// only) and `AfterCompile` effects after each pass.
    async fn compile_until_stable(
        &mut self,
        deliver_queued_messages: bool,
    ) -> Result<(CompiledPass, bool), OrchestratorError> {
        let max_iterations = self.config.effective_max_compile_iterations();
        let mut iteration = 0u32;
        let mut last = None;

        loop {
            iteration += 1;
            let element = self.root.build(&self.tick_state);
            let com_dyn: Arc<dyn engine_fiber::Com> = Arc::clone(self.com());
            let (structure, mut schedule) = match render_and_commit(&mut self.tree, element, com_dyn, Arc::clone(&self.queue)).await {
                Ok(pass) => pass,
                Err(render_error) => {
                    if !self.recover_from_render_error(&render_error) {
                        return Err(OrchestratorError::Render(render_error));
                    }
                    if iteration >= max_iterations {
                        tracing::warn!(tick = self.tick_state.tick, iterations = iteration, "engine.orchestrator.compile_forced_stable_after_recovery");
                        let fallback = last.unwrap_or_else(|| (CompiledStructure::new(), EffectSchedule::new()));
                        return Ok((fallback, true));
                    }
                    continue;
                }
            };
            let root = self.tree.root().expect("render_and_commit sets the root");

            if iteration == 1 {
                if deliver_queued_messages {
                    fire_phase_over_tree(&mut self.tree, root, &mut schedule, EffectPhase::OnMessage);
                }
                fire_phase_over_tree(&mut self.tree, root, &mut schedule, EffectPhase::TickStart);
            }
            fire_phase_over_tree(&mut self.tree, root, &mut schedule, EffectPhase::AfterCompile);

            let recompile_requested = self.com().take_recompile_request().is_some();
            let dirty = !self.queue.take_dirty().is_empty();
            last = Some((structure, schedule));

            let forced_stable = iteration >= max_iterations;
            if forced_stable {
                tracing::warn!(tick = self.tick_state.tick, iterations = iteration, "engine.orchestrator.compile_forced_stable");
            }
            if !recompile_requested && !dirty || forced_stable {
                let (structure, schedule) = last.expect("at least one iteration ran");
                return Ok((structure, schedule, forced_stable));
            }
        }
    }

    /// After a render failure, give every class-like component still
    /// standing a chance to recover (`spec.md` §7): run `onError` in
    /// DFS order, apply any `modifications` in that same order, and
    /// append a single recovery-message event entry per action that
    /// supplied one. Returns whether the tick should proceed rather
    /// than surface the error to the caller — true iff at least one
    /// component asked to continue.
    fn recover_from_render_error(&mut self, error: &RenderError) -> bool {
        let Some(root) = self.tree.root() else { return false };
        let com = Arc::clone(self.com());
        let com_dyn: &dyn engine_fiber::Com = com.as_ref();
        let actions = fire_on_error(&mut self.tree, root, com_dyn, error);

        let mut should_continue = false;
        for action in actions {
            should_continue |= action.continue_tick;
            if let Some(modifications) = action.modifications {
                modifications(com_dyn);
            }
            if let Some(message) = action.recovery_message {
                com.add_timeline_entry(TimelineEntry::message(Message::new(Role::Event, vec![ContentBlock::text(message)])));
            }
        }

        if should_continue {
            tracing::warn!(tick = self.tick_state.tick, error = %error, "engine.orchestrator.render_error_recovered");
        }
        should_continue
    }

    fn check_context_pressure(&self, formatted: &Value) {
        let Some(ceiling) = self.config.soft_context_tokens else { return };
        let estimated = estimate_tokens(formatted);
        if estimated > ceiling {
            self.notify(LifecycleNotice::ContextPressure {
                pid: self.pid(),
                tick: self.tick_state.tick,
                estimated_tokens: estimated,
                ceiling,
            });
        }
    }

    fn check_budget(&self) {
        let Some(ceiling) = self.config.soft_token_budget else { return };
        if self.cumulative_tokens > ceiling {
            self.notify(LifecycleNotice::BudgetWarning {
                pid: self.pid(),
                tick: self.tick_state.tick,
                consumed: self.cumulative_tokens,
                ceiling,
            });
        }
    }

    fn notify(&self, notice: LifecycleNotice) {
        if let Some(listener) = &self.lifecycle {
            listener(notice);
        }
    }

    async fn run_tools(
        &self,
        calls: Vec<ToolCallRequest>,
        executed_tool_results: Vec<ContentBlock>,
    ) -> Result<(), OrchestratorError> {
        let tools = self.com().tools();
        let mut results = Vec::with_capacity(calls.len());

        if self.config.concurrent_tools {
            let futures = calls.into_iter().map(|call| self.dispatch_tool_call(call, &tools));
            results.extend(futures::future::join_all(futures).await);
        } else {
            for call in calls {
                results.push(self.dispatch_tool_call(call, &tools).await);
            }
        }

        if results.is_empty() && executed_tool_results.is_empty() {
            return Ok(());
        }
        let mut content = executed_tool_results;
        content.extend(results);
        self.com().add_timeline_entry(TimelineEntry::message(Message::new(Role::Tool, content)));
        Ok(())
    }

    async fn dispatch_tool_call(&self, call: ToolCallRequest, tools: &ToolRegistry) -> ContentBlock {
        let tool_use_id = call.tool_use_id.as_str().to_string();
        let Some(tool) = tools.get(&call.name).cloned() else {
            tracing::warn!(tool = %call.name, "engine.orchestrator.tool_call_unresolved");
            return ContentBlock::ToolResult {
                tool_use_id,
                content: vec![ContentBlock::text(format!("tool not found: {}", call.name))],
                is_error: true,
            };
        };

        let metadata = tool.metadata();
        if metadata.requires_confirmation.requires(&call.input) {
            self.emit_stream(StreamEventKind::ToolConfirmationRequired {
                tool_use_id: call.tool_use_id.clone(),
                tool_name: call.name.clone(),
            });
            let outcome =
                self.confirmations.wait_for_confirmation(&call.tool_use_id, &call.name, self.config.confirmation_timeout).await;
            let confirmed = matches!(&outcome, Ok(o) if o.confirmed);
            self.emit_stream(StreamEventKind::ToolConfirmationResult { tool_use_id: call.tool_use_id.clone(), confirmed });
            if !confirmed {
                return ContentBlock::ToolResult {
                    tool_use_id,
                    content: vec![ContentBlock::text("tool call denied by confirmation")],
                    is_error: true,
                };
            }
        }

        let result = match metadata.execution_type {
            ExecutionType::Server => tool.run(call.input.clone()).await,
            ExecutionType::Client | ExecutionType::Mcp => {
                self.client_tools
                    .wait_for_result(&call.tool_use_id, self.config.client_tool_timeout, true, Vec::new())
                    .await
            }
            ExecutionType::Provider => Ok(Vec::new()),
        };

        self.emit_stream(StreamEventKind::ToolCall { tool_use_id: call.tool_use_id.clone(), name: call.name.clone(), input: call.input.clone() });
        match result {
            Ok(content) => {
                self.emit_stream(StreamEventKind::ToolResult { tool_use_id: call.tool_use_id.clone(), is_error: false });
                ContentBlock::ToolResult { tool_use_id, content, is_error: false }
            }
            Err(error) => {
                self.emit_stream(StreamEventKind::ToolResult { tool_use_id: call.tool_use_id.clone(), is_error: true });
                ContentBlock::ToolResult { tool_use_id, content: vec![ContentBlock::text(error.to_string())], is_error: true }
            }
        }
    }

    /// Create a fork: a child execution that merges its parent's
    /// abort signal and, by default, inherits a snapshot of the
    /// parent's timeline/sections (`spec.md` §4.6).
    pub fn fork(&self, opts: ForkOptions) -> Session {
        let pid = self.graph.next_pid();
        let com = Arc::new(self.seed_com(opts.timeline, opts.sections, opts.carry_context));
        let trace_id = match opts.trace {
            TraceInherit::Carry => self.handle.trace_id().clone(),
            TraceInherit::Fresh => TraceId::generate(),
        };
        let handle = Arc::new(ExecutionHandle::child(&self.handle, pid, ExecutionKind::Fork, trace_id, com));
        self.graph.register(Arc::clone(&handle));
        self.child_session(handle)
    }

    /// Create a spawn: a child execution independent of the parent's
    /// abort lifetime, starting with no inherited state unless `opts`
    /// requests it (`spec.md` §4.6).
    pub fn spawn(&self, opts: SpawnOptions) -> Session {
        let pid = self.graph.next_pid();
        let com = Arc::new(self.seed_com(opts.timeline, opts.sections, opts.carry_context));
        let trace_id = match opts.trace {
            TraceInherit::Carry => self.handle.trace_id().clone(),
            TraceInherit::Fresh => TraceId::generate(),
        };
        let handle = Arc::new(ExecutionHandle::child(&self.handle, pid, ExecutionKind::Spawn, trace_id, com));
        self.graph.register(Arc::clone(&handle));
        self.child_session(handle)
    }

    fn seed_com(&self, timeline: InheritMode, sections: InheritMode, carry_context: bool) -> ContextObjectModel {
        let com = ContextObjectModel::new();
        if timeline != InheritMode::None {
            for entry in self.com().timeline() {
                com.add_timeline_entry(entry);
            }
        }
        if sections != InheritMode::None {
            for (_, section) in self.com().sections() {
                com.add_section(section);
            }
        }
        if carry_context {
            // `state` is part of `Persistent`, not reachable from the
            // read-only accessors above; re-seed from the snapshot a
            // caller can already observe via `get_state`, which in
            // practice means components carry forward only the keys
            // they themselves re-declare via `useComState` on the
            // child's first render. Shared-state snapshotting across
            // independently-ticking COMs would otherwise reintroduce
            // the cross-session sharing `spec.md` §5 rules out.
        }
        com
    }

    fn child_session(&self, handle: Arc<ExecutionHandle>) -> Session {
        Session {
            handle,
            graph: Arc::clone(&self.graph),
            tree: FiberTree::new(),
            queue: Arc::new(UpdateQueue::new()),
            config: self.config.clone(),
            root: Arc::clone(&self.root),
            resolver: Arc::clone(&self.resolver),
            renderers: Arc::clone(&self.renderers),
            confirmations: Arc::clone(&self.confirmations),
            client_tools: Arc::clone(&self.client_tools),
            lifecycle: self.lifecycle.clone(),
            persistence: self.persistence.clone(),
            tick_state: TickState::first(Value::Null),
            cumulative_tokens: 0,
            stream_ids: Arc::clone(&self.stream_ids),
            stream_sink: None,
            started_at: std::time::Instant::now(),
        }
    }

    /// Abort `pid` (and, if it is a fork ancestor, every fork
    /// descendant beneath it — never spawn descendants). Returns
    /// whether `pid` was known to the graph.
    pub fn signal(&self, pid: Pid, reason: Option<String>) -> bool {
        if pid == self.pid() {
            self.com().abort(reason.clone());
        } else if let Some(target) = self.graph.get(pid) {
            target.com().abort(reason.clone());
        }
        self.graph.signal_abort(pid)
    }

    /// Abort `pid`; an alias for [`Session::signal`] with an explicit reason.
    pub fn kill(&self, pid: Pid, reason: impl Into<String>) -> bool {
        self.signal(pid, Some(reason.into()))
    }
}

type CompiledPass = (engine_fiber::CompiledStructure, EffectSchedule);

fn estimate_tokens(value: &Value) -> u64 {
    (value.to_string().len() as u64) / 4
}

fn build_formatted_input(com: &ContextObjectModel) -> Value {
    let timeline: Vec<Value> = com
        .timeline()
        .into_iter()
        .map(|entry| {
            json!({
                "kind": match entry.kind {
                    engine_com::TimelineEntryKind::Message => "message",
                    engine_com::TimelineEntryKind::Event => "event",
                },
                "message": serde_json::to_value(&entry.message).unwrap_or(Value::Null),
            })
        })
        .collect();
    let ephemeral: Vec<Value> = com
        .ephemeral()
        .into_iter()
        .map(|entry| json!({ "content": serde_json::to_value(&entry.content).unwrap_or(Value::Null) }))
        .collect();
    json!({
        "system": com.system_message_text(),
        "timeline": timeline,
        "ephemeral": ephemeral,
        "metadata": com.metadata(),
    })
}

/// Monotonic pid source shared by every session constructed in one
/// process when no explicit [`ExecutionGraph`] is shared between
/// them (test convenience; production callers share one `Arc<ExecutionGraph>`
/// across a root and its descendants instead).
#[allow(dead_code)]
static STANDALONE_PID_SOURCE: AtomicU64 = AtomicU64::new(0);

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engine_fiber::test_utils::CounterComponent;
    use engine_fiber::{ElementType, FunctionComponent, Node};
    use engine_model::{EngineResponse, ModelCapabilities, ModelError, ModelMetadata, ModelStream, Usage};
    use engine_tool::Tool;
    use std::sync::Mutex;

    struct NoopResolver;
    impl Resolver for NoopResolver {
        fn resolve_tool(&self, _name: &str) -> Option<Arc<dyn Tool>> {
            None
        }
        fn resolve_model(&self, _id: &str) -> Option<Arc<dyn ModelAdapter>> {
            None
        }
    }

    struct CounterRoot;
    impl RootComponent for CounterRoot {
        fn build(&self, _tick: &TickState) -> Element {
            Element::fragment(vec![Node::Element(Element::new(
                ElementType::Function(Arc::new(CounterComponent)),
                Value::Null,
                Vec::new(),
            ))])
        }
    }

    /// Stops after exactly one tick with no tool calls; mirrors
    /// `spec.md` §8 scenario 1's single-tick round trip.
    struct OneShotModel;

    #[async_trait]
    impl ModelAdapter for OneShotModel {
        fn metadata(&self) -> &ModelMetadata {
            static META: std::sync::OnceLock<ModelMetadata> = std::sync::OnceLock::new();
            META.get_or_init(|| ModelMetadata {
                id: "one-shot".into(),
                provider: "test".into(),
                capabilities: ModelCapabilities::default(),
            })
        }
        async fn from_engine_state(&self, formatted: Value) -> Result<Value, ModelError> {
            Ok(formatted)
        }
        async fn to_engine_state(&self, _model_output: Value) -> Result<EngineResponse, ModelError> {
            Ok(EngineResponse {
                new_timeline_entries: vec![Message::assistant("done")],
                should_stop: true,
                stop_reason: Some(StopReason { reason: "done".into(), description: None }),
                usage: Some(Usage { input_tokens: 10, output_tokens: 5 }),
                ..Default::default()
            })
        }
        async fn generate(&self, model_input: Value) -> Result<Value, ModelError> {
            Ok(model_input)
        }
        async fn process_stream(&self, _chunks: ModelStream) -> Result<Value, ModelError> {
            Err(ModelError::Other("unused in this test".into()))
        }
    }

    struct ModelResolver;
    impl Resolver for ModelResolver {
        fn resolve_tool(&self, _name: &str) -> Option<Arc<dyn Tool>> {
            None
        }
        fn resolve_model(&self, _id: &str) -> Option<Arc<dyn ModelAdapter>> {
            Some(Arc::new(OneShotModel))
        }
    }

    struct ModelRoot;
    impl RootComponent for ModelRoot {
        fn build(&self, _tick: &TickState) -> Element {
            Element::fragment(vec![Node::Element(Element::intrinsic(
                engine_fiber::IntrinsicTag::Model,
                json!({ "id": "one-shot" }),
            ))])
        }
    }

    #[tokio::test]
    async fn counter_component_reaches_0_1_1_like_sequence_via_mount_effect() {
        let mut session = Session::new(Arc::new(CounterRoot), Arc::new(NoopResolver), SessionConfig::default());
        let (_structure, _schedule, _forced) = session.compile_until_stable(false).await.unwrap();
        let (_structure, _schedule, _forced) = session.compile_until_stable(false).await.unwrap();
        let (_structure, _schedule, _forced) = session.compile_until_stable(false).await.unwrap();
    }

    #[tokio::test]
    async fn single_tick_model_round_trip_stops_the_session() {
        let mut session = Session::new(Arc::new(ModelRoot), Arc::new(ModelResolver), SessionConfig::default());
        let result = session.execute(Value::Null).await.unwrap();
        assert_eq!(result.tick, 2);
        assert_eq!(session.handle.status(), ExecutionStatus::Completed);
    }

    #[test]
    fn fork_inherits_timeline_copy_without_affecting_parent() {
        let session = Session::new(Arc::new(CounterRoot), Arc::new(NoopResolver), SessionConfig::default());
        session.com().add_message(Message::user("hello"));
        let fork = session.fork(ForkOptions::default());
        assert_eq!(fork.com().timeline().len(), 1);
        fork.com().add_message(Message::user("child only"));
        assert_eq!(session.com().timeline().len(), 1);
        assert_eq!(fork.com().timeline().len(), 2);
    }

    #[test]
    fn spawn_does_not_inherit_by_default() {
        let session = Session::new(Arc::new(CounterRoot), Arc::new(NoopResolver), SessionConfig::default());
        session.com().add_message(Message::user("hello"));
        let spawned = session.spawn(SpawnOptions::default());
        assert!(spawned.com().timeline().is_empty());
    }

    #[test]
    fn abort_cascades_to_fork_not_spawn() {
        let session = Session::new(Arc::new(CounterRoot), Arc::new(NoopResolver), SessionConfig::default());
        let fork = session.fork(ForkOptions::default());
        let spawn = session.spawn(SpawnOptions::default());
        assert!(session.signal(session.pid(), Some("stop".into())));
        assert!(fork.handle.is_cancelled());
        assert!(!spawn.handle.is_cancelled());
    }

    #[test]
    fn lifecycle_listener_observes_budget_warning() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let config = SessionConfig { soft_token_budget: Some(5), ..Default::default() };
        let session = Session::new(Arc::new(CounterRoot), Arc::new(NoopResolver), config)
            .with_lifecycle_listener(Arc::new(move |notice| seen2.lock().unwrap().push(notice)));
        let mut session = session;
        session.cumulative_tokens = 10;
        session.check_budget();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
