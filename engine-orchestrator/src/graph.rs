//! The execution graph: a forest of [`ExecutionHandle`]s keyed by pid
//! (`spec.md` §4.6).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use engine_types::{Pid, PidAllocator};

use crate::handle::{ExecutionHandle, ExecutionKind, ExecutionStatus};

/// A handle plus its children, for [`ExecutionGraph::tree`] callers
/// that want the whole subtree at once.
pub struct ExecutionTreeNode {
    /// This node's handle.
    pub handle: Arc<ExecutionHandle>,
    /// Its direct children, recursively.
    pub children: Vec<ExecutionTreeNode>,
}

/// Shared, mutex-guarded registry of every execution handle spawned
/// from one root, so it can be handed to the tokio tasks backing
/// concurrent fork/spawn children (`SPEC_FULL.md` §4.6 addition),
/// mirroring the teacher's `LocalOrchestrator`'s shared dispatch state.
#[derive(Default)]
pub struct ExecutionGraph {
    handles: Mutex<HashMap<Pid, Arc<ExecutionHandle>>>,
    children: Mutex<HashMap<Pid, Vec<Pid>>>,
    pid_alloc: PidAllocator,
}

impl ExecutionGraph {
    /// An empty graph with its own pid allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next pid for a new handle in this graph.
    pub fn next_pid(&self) -> Pid {
        self.pid_alloc.next()
    }

    /// Register a handle, linking it under its parent's child list if
    /// it has one.
    pub fn register(&self, handle: Arc<ExecutionHandle>) {
        let pid = handle.pid();
        let parent = handle.parent_pid();
        self.handles.lock().expect("execution graph poisoned").insert(pid, handle);
        if let Some(parent) = parent {
            self.children.lock().expect("execution graph poisoned").entry(parent).or_default().push(pid);
        }
    }

    /// Look up a handle by pid.
    pub fn get(&self, pid: Pid) -> Option<Arc<ExecutionHandle>> {
        self.handles.lock().expect("execution graph poisoned").get(&pid).cloned()
    }

    /// Direct children of `pid`, in registration order.
    pub fn children_of(&self, pid: Pid) -> Vec<Arc<ExecutionHandle>> {
        self.children
            .lock()
            .expect("execution graph poisoned")
            .get(&pid)
            .into_iter()
            .flatten()
            .filter_map(|child_pid| self.get(*child_pid))
            .collect()
    }

    /// Running fork children of `pid` (`spec.md` §4.5's
    /// `getOutstandingForks`, consulted at the Awaiting-Forks phase).
    pub fn outstanding_forks(&self, pid: Pid) -> Vec<Arc<ExecutionHandle>> {
        self.children_of(pid)
            .into_iter()
            .filter(|h| h.kind() == ExecutionKind::Fork && h.status() == ExecutionStatus::Running)
            .collect()
    }

    /// Every fork handle still running whose parent has already
    /// reached a terminal status (`spec.md` §4.6's orphan policy:
    /// orphaned but not itself cancelled unless the parent *was
    /// cancelled*, in which case cascade already cancelled it).
    pub fn orphaned_forks(&self) -> Vec<Arc<ExecutionHandle>> {
        let all: Vec<Arc<ExecutionHandle>> =
            self.handles.lock().expect("execution graph poisoned").values().cloned().collect();
        all.into_iter()
            .filter(|h| h.kind() == ExecutionKind::Fork && h.status() == ExecutionStatus::Running)
            .filter(|h| match h.parent_pid().and_then(|p| self.get(p)) {
                Some(parent) => parent.status() != ExecutionStatus::Running,
                None => false,
            })
            .collect()
    }

    /// Signal `pid`: on `abort`/`interrupt`/`shutdown`, cancel its
    /// token (which — via [`ExecutionHandle::child`]'s token
    /// derivation — automatically cancels every fork descendant's
    /// token too) and walk fork-only edges to mark each cancelled
    /// descendant's status, stopping at any spawn boundary.
    pub fn signal_abort(&self, pid: Pid) -> bool {
        let Some(handle) = self.get(pid) else {
            return false;
        };
        handle.cancel();
        self.cascade_fork_cancel(pid);
        true
    }

    fn cascade_fork_cancel(&self, pid: Pid) {
        for child in self.children_of(pid) {
            if child.kind() != ExecutionKind::Fork {
                continue;
            }
            child.cancel();
            self.cascade_fork_cancel(child.pid());
        }
    }

    /// The subtree rooted at `pid`, as a nested tree (`getTree`-style
    /// introspection for diagnostics/tests).
    pub fn tree(&self, pid: Pid) -> Option<ExecutionTreeNode> {
        let handle = self.get(pid)?;
        let children = self.children_of(pid).into_iter().filter_map(|c| self.tree(c.pid())).collect();
        Some(ExecutionTreeNode { handle, children })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_com::ContextObjectModel;
    use engine_types::TraceId;
    use std::sync::Arc;

    fn com() -> Arc<ContextObjectModel> {
        Arc::new(ContextObjectModel::new())
    }

    #[test]
    fn cancelling_root_cascades_through_forks_not_spawns() {
        let graph = ExecutionGraph::new();
        let root = Arc::new(ExecutionHandle::root(Pid(0), TraceId::generate(), com()));
        graph.register(Arc::clone(&root));

        let fork = Arc::new(ExecutionHandle::child(&root, Pid(1), ExecutionKind::Fork, TraceId::generate(), com()));
        graph.register(Arc::clone(&fork));

        let grandchild_fork =
            Arc::new(ExecutionHandle::child(&fork, Pid(2), ExecutionKind::Fork, TraceId::generate(), com()));
        graph.register(Arc::clone(&grandchild_fork));

        let spawn = Arc::new(ExecutionHandle::child(&root, Pid(3), ExecutionKind::Spawn, TraceId::generate(), com()));
        graph.register(Arc::clone(&spawn));

        assert!(graph.signal_abort(Pid(0)));

        assert_eq!(fork.status(), ExecutionStatus::Cancelled);
        assert_eq!(grandchild_fork.status(), ExecutionStatus::Cancelled);
        assert_eq!(spawn.status(), ExecutionStatus::Running);
    }

    #[test]
    fn orphaned_fork_is_discoverable_once_parent_completes() {
        let graph = ExecutionGraph::new();
        let root = Arc::new(ExecutionHandle::root(Pid(0), TraceId::generate(), com()));
        graph.register(Arc::clone(&root));
        let fork = Arc::new(ExecutionHandle::child(&root, Pid(1), ExecutionKind::Fork, TraceId::generate(), com()));
        graph.register(Arc::clone(&fork));

        assert!(graph.orphaned_forks().is_empty());
        root.set_status(ExecutionStatus::Completed);
        let orphans = graph.orphaned_forks();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].pid(), Pid(1));
    }

    #[test]
    fn signal_unknown_pid_returns_false() {
        let graph = ExecutionGraph::new();
        assert!(!graph.signal_abort(Pid(99)));
    }
}
