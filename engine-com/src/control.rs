//! Tick-control requests and their end-of-tick resolution
//! (`spec.md` §3 "Tick State", §4.4's `requestStop`/`requestContinue`
//! row, and §8's resolution-priority invariant).

use serde_json::Value;

/// What a tick-control request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStatus {
    /// Stop ticking.
    Completed,
    /// Stop ticking due to an abort.
    Aborted,
    /// Keep ticking.
    Continue,
}

/// A single component's stop/continue request for the current tick.
#[derive(Debug, Clone)]
pub struct ControlRequest {
    /// Which status this request asks for.
    pub status: ControlStatus,
    /// Higher priority wins among competing `stop` requests.
    pub priority: i32,
    /// Identifies the requesting component/ref, for diagnostics.
    pub owner_id: Option<String>,
    /// Free-form reason.
    pub reason: Option<String>,
    /// Machine-readable termination reason, if stopping.
    pub termination_reason: Option<String>,
    /// Free-form metadata.
    pub metadata: Value,
}

impl ControlRequest {
    /// A `stop` request at the given priority.
    pub fn stop(priority: i32) -> Self {
        Self {
            status: ControlStatus::Completed,
            priority,
            owner_id: None,
            reason: None,
            termination_reason: None,
            metadata: Value::Null,
        }
    }

    /// A `continue` request at the given priority.
    pub fn continue_(priority: i32) -> Self {
        Self { status: ControlStatus::Continue, ..Self::stop(priority) }
    }
}

/// Resolve a tick's pending control requests against a default status,
/// per `spec.md` §4.4's "Tick-control resolution" and §8's invariant:
/// sort by priority descending; the highest-priority `stop` wins;
/// otherwise, if `default` is non-continue and a `continue` request
/// exists, it overrides to continue; otherwise use `default`.
///
/// Requests are consumed by the caller (the orchestrator clears the
/// COM's `controlRequests` list after calling this).
pub fn resolve(requests: &[ControlRequest], default: ControlStatus) -> ControlStatus {
    let mut sorted: Vec<&ControlRequest> = requests.iter().collect();
    sorted.sort_by(|a, b| b.priority.cmp(&a.priority));

    if let Some(stop) = sorted.iter().find(|r| r.status != ControlStatus::Continue) {
        return stop.status;
    }

    if default != ControlStatus::Continue && sorted.iter().any(|r| r.status == ControlStatus::Continue) {
        return ControlStatus::Continue;
    }

    default
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_priority_stop_wins() {
        let requests = vec![ControlRequest::stop(1), ControlRequest::stop(5)];
        assert_eq!(resolve(&requests, ControlStatus::Continue), ControlStatus::Completed);
    }

    #[test]
    fn continue_overrides_non_continue_default() {
        let requests = vec![ControlRequest::continue_(1)];
        assert_eq!(resolve(&requests, ControlStatus::Completed), ControlStatus::Continue);
    }

    #[test]
    fn no_requests_uses_default() {
        assert_eq!(resolve(&[], ControlStatus::Completed), ControlStatus::Completed);
    }

    #[test]
    fn stop_beats_continue_regardless_of_priority() {
        let requests = vec![ControlRequest::continue_(100), ControlRequest::stop(1)];
        assert_eq!(resolve(&requests, ControlStatus::Continue), ControlStatus::Completed);
    }
}
