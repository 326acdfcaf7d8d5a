//! Rendezvous coordinators for tool confirmation and client-executed
//! tool results (`spec.md` §4.7).
//!
//! Both coordinators share the same shape: a pending table keyed by
//! `tool_use_id`, a `oneshot` channel per entry, and an optional
//! timeout. This mirrors the teacher's use of `tokio::sync` primitives
//! for async rendezvous (`neuron-orch-local`'s `tokio::spawn` dispatch)
//! generalized to a wait-for-external-signal shape instead of
//! fire-and-collect.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use engine_types::{ContentBlock, ToolUseId};
use tokio::sync::oneshot;

use crate::error::ToolError;

/// The outcome of a tool-confirmation rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationOutcome {
    /// Whether the call was confirmed.
    pub confirmed: bool,
    /// Whether the caller asked to remember this decision for future
    /// calls to the same tool (`always`).
    pub always: bool,
}

/// Holds `{tool_use_id -> sender}` for pending confirmations.
/// `wait_for_confirmation` registers a pending entry and awaits its
/// resolution; `resolve_confirmation` completes it from the external
/// caller's side.
#[derive(Default)]
pub struct ConfirmationCoordinator {
    pending: Mutex<HashMap<String, oneshot::Sender<ConfirmationOutcome>>>,
}

impl ConfirmationCoordinator {
    /// An empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending confirmation for `tool_use_id` and await its
    /// resolution, optionally bounded by `timeout`. On timeout the
    /// entry is removed and a [`ToolError::TimedOut`] is returned.
    pub async fn wait_for_confirmation(
        &self,
        tool_use_id: &ToolUseId,
        _tool_name: &str,
        timeout: Option<Duration>,
    ) -> Result<ConfirmationOutcome, ToolError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().expect("coordinator poisoned").insert(tool_use_id.as_str().to_string(), tx);

        let result = match timeout {
            Some(d) => tokio::time::timeout(d, rx).await.map_err(|_| ToolError::TimedOut("tool confirmation")),
            None => Ok(rx.await),
        };

        match result {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(ToolError::Denied),
            Err(timed_out) => {
                self.pending.lock().expect("coordinator poisoned").remove(tool_use_id.as_str());
                tracing::warn!(tool_use_id = %tool_use_id, "engine.tool.confirmation_timed_out");
                Err(timed_out)
            }
        }
    }

    /// Resolve a pending confirmation from the external caller's side.
    /// A no-op (silently dropped) if `tool_use_id` has no pending entry
    /// (already resolved, cancelled, or timed out).
    pub fn resolve_confirmation(&self, tool_use_id: &ToolUseId, confirmed: bool, always: bool) {
        if let Some(tx) = self.pending.lock().expect("coordinator poisoned").remove(tool_use_id.as_str()) {
            let _ = tx.send(ConfirmationOutcome { confirmed, always });
        }
    }

    /// Cancel a pending confirmation, resolving its waiter with a
    /// denial (the `aborted` outcome from `spec.md` §4.7).
    pub fn cancel(&self, tool_use_id: &ToolUseId) {
        if let Some(tx) = self.pending.lock().expect("coordinator poisoned").remove(tool_use_id.as_str()) {
            let _ = tx.send(ConfirmationOutcome { confirmed: false, always: false });
        }
    }

    /// Number of confirmations currently awaiting resolution.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("coordinator poisoned").len()
    }
}

/// Holds `{tool_use_id -> sender}` for pending client-tool results.
pub struct ClientToolCoordinator {
    pending: Mutex<HashMap<String, oneshot::Sender<Vec<ContentBlock>>>>,
}

impl Default for ClientToolCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientToolCoordinator {
    /// An empty coordinator.
    pub fn new() -> Self {
        Self { pending: Mutex::new(HashMap::new()) }
    }

    /// Register a pending client-tool call and await its result,
    /// optionally bounded by `timeout`. If the call does not require a
    /// response (`requires_response = false`) and no result arrives
    /// within `timeout`, `default_result` is returned instead of an
    /// error.
    pub async fn wait_for_result(
        &self,
        tool_use_id: &ToolUseId,
        timeout: Option<Duration>,
        requires_response: bool,
        default_result: Vec<ContentBlock>,
    ) -> Result<Vec<ContentBlock>, ToolError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().expect("coordinator poisoned").insert(tool_use_id.as_str().to_string(), tx);

        let awaited = match timeout {
            Some(d) => tokio::time::timeout(d, rx).await,
            None => Ok(rx.await.map_err(|_| ())),
        };

        match awaited {
            Ok(Ok(Ok(content))) => Ok(content),
            Ok(Ok(Err(_))) | Ok(Err(_)) => Err(ToolError::ExecutionFailed("client result channel dropped".into())),
            Err(_) => {
                self.pending.lock().expect("coordinator poisoned").remove(tool_use_id.as_str());
                if requires_response {
                    tracing::warn!(tool_use_id = %tool_use_id, "engine.tool.client_result_timed_out");
                    Err(ToolError::TimedOut("client tool result"))
                } else {
                    Ok(default_result)
                }
            }
        }
    }

    /// Resolve a pending client-tool call from the external caller's
    /// side. A no-op if no entry is pending for `tool_use_id`.
    pub fn resolve_result(&self, tool_use_id: &ToolUseId, content: Vec<ContentBlock>) {
        if let Some(tx) = self.pending.lock().expect("coordinator poisoned").remove(tool_use_id.as_str()) {
            let _ = tx.send(content);
        }
    }

    /// Number of client-tool calls currently awaiting a result.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("coordinator poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn confirmation_denied_produces_denial_error() {
        let coord = ConfirmationCoordinator::new();
        let id = ToolUseId::new("x");
        let coord_ref = &coord;
        let (outcome, _) = tokio::join!(
            coord_ref.wait_for_confirmation(&id, "delete", None),
            async {
                tokio::task::yield_now().await;
                coord_ref.resolve_confirmation(&id, false, false);
            }
        );
        let outcome = outcome.unwrap();
        assert!(!outcome.confirmed);
    }

    #[tokio::test]
    async fn confirmation_times_out() {
        let coord = ConfirmationCoordinator::new();
        let id = ToolUseId::new("x");
        let result = coord.wait_for_confirmation(&id, "delete", Some(Duration::from_millis(10))).await;
        assert!(matches!(result, Err(ToolError::TimedOut(_))));
        assert_eq!(coord.pending_count(), 0);
    }

    #[tokio::test]
    async fn client_tool_without_response_uses_default() {
        let coord = ClientToolCoordinator::new();
        let id = ToolUseId::new("y");
        let result = coord
            .wait_for_result(&id, Some(Duration::from_millis(10)), false, vec![ContentBlock::text("default")])
            .await
            .unwrap();
        assert_eq!(result, vec![ContentBlock::text("default")]);
    }
}
