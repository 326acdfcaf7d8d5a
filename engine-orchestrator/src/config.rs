//! Orchestrator-level configuration (`SPEC_FULL.md` §3 additions).

use std::time::Duration;

/// Hard upper bound on compile-stabilization iterations, regardless of
/// what a [`SessionConfig`] requests (`spec.md` §8's "terminates in
/// ≤ maxIterations" invariant, with the cap spec.md §2's overview
/// table fixes at 50 even though the default is 10).
pub const MAX_COMPILE_ITERATIONS_HARD_CAP: u32 = 50;

/// Default compile-stabilization iteration cap before `forcedStable`.
pub const DEFAULT_MAX_COMPILE_ITERATIONS: u32 = 10;

/// Orchestrator-level knobs, mirroring the teacher's `*Config` +
/// `Default` convention (`neuron-orch-local::LocalOrchestratorConfig`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionConfig {
    /// Maximum ticks before the session is forced to stop.
    pub max_ticks: u64,
    /// Maximum `compileUntilStable` iterations per tick, clamped to
    /// [`MAX_COMPILE_ITERATIONS_HARD_CAP`].
    pub max_compile_iterations: u32,
    /// Whether tool calls within one tick run concurrently (fan-out)
    /// or sequentially.
    pub concurrent_tools: bool,
    /// Default timeout waiting for a tool-confirmation resolution.
    #[serde(with = "duration_millis_opt")]
    pub confirmation_timeout: Option<Duration>,
    /// Default timeout waiting for a client-executed tool's result.
    #[serde(with = "duration_millis_opt")]
    pub client_tool_timeout: Option<Duration>,
    /// Soft token-usage ceiling that triggers a `BudgetWarning`
    /// lifecycle notice (observational only; does not stop the tick).
    pub soft_token_budget: Option<u64>,
    /// Soft estimated-token ceiling on the formatted model input that
    /// triggers a `ContextPressure` lifecycle notice before the model
    /// call is made.
    pub soft_context_tokens: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_ticks: 100,
            max_compile_iterations: DEFAULT_MAX_COMPILE_ITERATIONS,
            concurrent_tools: true,
            confirmation_timeout: None,
            client_tool_timeout: None,
            soft_token_budget: None,
            soft_context_tokens: None,
        }
    }
}

impl SessionConfig {
    /// This config's compile-iteration cap, clamped to the hard cap.
    pub fn effective_max_compile_iterations(&self) -> u32 {
        self.max_compile_iterations.min(MAX_COMPILE_ITERATIONS_HARD_CAP).max(1)
    }
}

mod duration_millis_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let millis: Option<u64> = Option::deserialize(d)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_compile_cap() {
        assert_eq!(SessionConfig::default().max_compile_iterations, 10);
    }

    #[test]
    fn iteration_cap_clamps_to_hard_cap() {
        let config = SessionConfig { max_compile_iterations: 1000, ..Default::default() };
        assert_eq!(config.effective_max_compile_iterations(), MAX_COMPILE_ITERATIONS_HARD_CAP);
    }
}
