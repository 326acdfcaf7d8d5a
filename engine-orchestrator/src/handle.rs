//! [`ExecutionHandle`]: the unit the execution graph tracks for one
//! root execution or one of its fork/spawn descendants (`spec.md`
//! §3 "ExecutionHandle", §4.6).

use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use engine_com::ContextObjectModel;
use engine_types::{Pid, TraceId};
use tokio_util::sync::CancellationToken;

/// How a handle relates to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    /// The top-level execution; has no parent.
    Root,
    /// A `fork` — inherits and merges the parent's abort signal.
    Fork,
    /// A `spawn` — independent of the parent's abort lifetime.
    Spawn,
}

/// Terminal/non-terminal status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Ticking.
    Running,
    /// Finished normally.
    Completed,
    /// Finished with an unrecovered error.
    Failed,
    /// Aborted via `signal`/`kill`, or cascaded from a parent fork's abort.
    Cancelled,
}

impl ExecutionStatus {
    fn discriminant(self) -> u8 {
        match self {
            ExecutionStatus::Running => 0,
            ExecutionStatus::Completed => 1,
            ExecutionStatus::Failed => 2,
            ExecutionStatus::Cancelled => 3,
        }
    }

    fn from_discriminant(d: u8) -> Self {
        match d {
            1 => ExecutionStatus::Completed,
            2 => ExecutionStatus::Failed,
            3 => ExecutionStatus::Cancelled,
            _ => ExecutionStatus::Running,
        }
    }
}

/// One node in the [`crate::graph::ExecutionGraph`] forest: a root
/// execution or one of its fork/spawn descendants.
///
/// The handle owns this execution's [`ContextObjectModel`] and
/// [`CancellationToken`]. Per `spec.md` §4.6, a fork's token is a
/// child of its parent's (so cancelling the parent automatically
/// cancels every fork descendant); a spawn's token is a fresh root
/// (cancelling the parent never reaches it).
pub struct ExecutionHandle {
    pid: Pid,
    parent_pid: Option<Pid>,
    root_pid: Pid,
    kind: ExecutionKind,
    trace_id: TraceId,
    status: AtomicU8,
    started_at: DateTime<Utc>,
    com: std::sync::Arc<ContextObjectModel>,
    cancel: CancellationToken,
}

impl ExecutionHandle {
    /// Build the root handle for a brand-new top-level execution.
    pub fn root(pid: Pid, trace_id: TraceId, com: std::sync::Arc<ContextObjectModel>) -> Self {
        Self {
            pid,
            parent_pid: None,
            root_pid: pid,
            kind: ExecutionKind::Root,
            trace_id,
            status: AtomicU8::new(ExecutionStatus::Running.discriminant()),
            started_at: Utc::now(),
            com,
            cancel: CancellationToken::new(),
        }
    }

    /// Build a child handle under `parent`, deriving its cancel token
    /// per `kind` (child-of-parent for `Fork`, independent for `Spawn`).
    pub fn child(
        parent: &ExecutionHandle,
        pid: Pid,
        kind: ExecutionKind,
        trace_id: TraceId,
        com: std::sync::Arc<ContextObjectModel>,
    ) -> Self {
        let cancel = match kind {
            ExecutionKind::Fork => parent.cancel.child_token(),
            ExecutionKind::Spawn | ExecutionKind::Root => CancellationToken::new(),
        };
        Self {
            pid,
            parent_pid: Some(parent.pid),
            root_pid: parent.root_pid,
            kind,
            trace_id,
            status: AtomicU8::new(ExecutionStatus::Running.discriminant()),
            started_at: Utc::now(),
            com,
            cancel,
        }
    }

    /// This handle's pid.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The pid of the execution that created this one, if any.
    pub fn parent_pid(&self) -> Option<Pid> {
        self.parent_pid
    }

    /// The pid of the top-level root this handle descends from.
    pub fn root_pid(&self) -> Pid {
        self.root_pid
    }

    /// Whether this is the root, a fork, or a spawn.
    pub fn kind(&self) -> ExecutionKind {
        self.kind
    }

    /// This execution's correlation id.
    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// When this execution started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// This execution's Context Object Model.
    pub fn com(&self) -> &std::sync::Arc<ContextObjectModel> {
        &self.com
    }

    /// Current status.
    pub fn status(&self) -> ExecutionStatus {
        ExecutionStatus::from_discriminant(self.status.load(Ordering::Acquire))
    }

    /// Transition to a new status. No-op once already terminal, since
    /// a finished execution's status does not flip back to running.
    pub fn set_status(&self, status: ExecutionStatus) {
        if self.status() == ExecutionStatus::Running || status == ExecutionStatus::Running {
            self.status.store(status.discriminant(), Ordering::Release);
        }
    }

    /// This handle's cancellation token. Cloning is cheap; cancelling
    /// any clone cancels every clone and, for fork children, every
    /// descendant fork's derived token.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether this handle's cancel token has fired (directly, or
    /// inherited from a parent fork's cancellation).
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel this execution: flips the token and marks the status
    /// `cancelled` unless it has already reached a terminal status.
    pub fn cancel(&self) {
        self.cancel.cancel();
        if self.status() == ExecutionStatus::Running {
            self.set_status(ExecutionStatus::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn com() -> std::sync::Arc<ContextObjectModel> {
        std::sync::Arc::new(ContextObjectModel::new())
    }

    #[test]
    fn fork_token_is_cancelled_by_parent() {
        let root = ExecutionHandle::root(Pid(0), TraceId::generate(), com());
        let fork = ExecutionHandle::child(&root, Pid(1), ExecutionKind::Fork, TraceId::generate(), com());
        root.cancel();
        assert!(fork.is_cancelled());
    }

    #[test]
    fn spawn_token_survives_parent_cancel() {
        let root = ExecutionHandle::root(Pid(0), TraceId::generate(), com());
        let spawn = ExecutionHandle::child(&root, Pid(1), ExecutionKind::Spawn, TraceId::generate(), com());
        root.cancel();
        assert!(!spawn.is_cancelled());
    }

    #[test]
    fn status_does_not_leave_terminal() {
        let root = ExecutionHandle::root(Pid(0), TraceId::generate(), com());
        root.set_status(ExecutionStatus::Completed);
        root.set_status(ExecutionStatus::Failed);
        assert_eq!(root.status(), ExecutionStatus::Completed);
    }
}
