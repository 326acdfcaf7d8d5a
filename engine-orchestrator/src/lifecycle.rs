//! Observational lifecycle notices beyond the hard `shouldStop`
//! control flow `spec.md` already specifies (`SPEC_FULL.md` §4.5
//! addition: a soft warning tier real agent runtimes need, grounded
//! in the teacher's `BudgetEvent`/`CompactionEvent` vocabulary kept
//! purely as an out-of-process signal, not a new core responsibility).

use engine_types::Pid;

/// A soft, non-authoritative notice the session emits to an injected
/// listener. Never affects `shouldContinue`; purely observational.
#[derive(Debug, Clone)]
pub enum LifecycleNotice {
    /// Cumulative token usage crossed [`crate::config::SessionConfig::soft_token_budget`].
    BudgetWarning {
        /// Execution this notice concerns.
        pid: Pid,
        /// Tick this was observed on.
        tick: u64,
        /// Cumulative input+output tokens consumed so far.
        consumed: u64,
        /// The configured soft ceiling that was crossed.
        ceiling: u64,
    },
    /// The formatted model input's estimated token count crossed
    /// [`crate::config::SessionConfig::soft_context_tokens`], observed
    /// just before the model call.
    ContextPressure {
        /// Execution this notice concerns.
        pid: Pid,
        /// Tick this was observed on.
        tick: u64,
        /// Rough estimated token count of the formatted input.
        estimated_tokens: u64,
        /// The configured soft ceiling that was crossed.
        ceiling: u64,
    },
}

/// Callback type for receiving [`LifecycleNotice`]s, injected at
/// session construction (`spec.md` §9's "global registries are
/// per-process bags; expressed as an injected object" pattern applied
/// to this observability seam too).
pub type LifecycleListener = std::sync::Arc<dyn Fn(LifecycleNotice) + Send + Sync>;
