//! Streaming lifecycle events emitted by the tick orchestrator's
//! `stream` entry point (`spec.md` §4.5/§6). Names are bit-exact per
//! the spec since they matter for interop with external subscribers.

use crate::duration::DurationMs;
use crate::id::{Pid, ToolUseId};
use serde::{Deserialize, Serialize};

/// A single streamed lifecycle event.
///
/// Every variant carries `id` (monotonic within one execution), `tick`
/// (the tick index it occurred in), and `timestamp` (milliseconds
/// since execution start) via the outer [`StreamEvent`] wrapper.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEventKind {
    /// The execution has started.
    ExecutionStart {
        /// The execution's pid.
        pid: Pid,
    },
    /// The execution has ended.
    ExecutionEnd {
        /// Final status description.
        status: String,
    },
    /// A tick has begun.
    TickStart,
    /// A tick has ended.
    TickEnd {
        /// Whether another tick will follow.
        should_continue: bool,
    },
    /// A model message has begun streaming.
    MessageStart,
    /// A model message has finished streaming.
    MessageEnd,
    /// A content block has begun.
    ContentStart {
        /// Index of the content block within the message.
        index: usize,
    },
    /// An incremental content delta.
    ContentDelta {
        /// Index of the content block within the message.
        index: usize,
        /// The incremental text.
        delta: String,
    },
    /// A content block has finished.
    ContentEnd {
        /// Index of the content block within the message.
        index: usize,
    },
    /// Extended-reasoning content has begun.
    ReasoningStart,
    /// Incremental reasoning delta.
    ReasoningDelta {
        /// The incremental reasoning text.
        delta: String,
    },
    /// Extended-reasoning content has finished.
    ReasoningEnd,
    /// The model requested a tool call.
    ToolCall {
        /// Id correlating this call with its eventual result.
        tool_use_id: ToolUseId,
        /// Name of the tool.
        name: String,
        /// Tool input.
        input: serde_json::Value,
    },
    /// A tool call produced a result.
    ToolResult {
        /// Id of the tool call this result answers.
        tool_use_id: ToolUseId,
        /// Whether the tool call errored.
        is_error: bool,
    },
    /// A tool call requires external confirmation before executing.
    ToolConfirmationRequired {
        /// Id of the pending tool call.
        tool_use_id: ToolUseId,
        /// Name of the tool.
        tool_name: String,
    },
    /// A pending confirmation was resolved.
    ToolConfirmationResult {
        /// Id of the tool call that was confirmed/denied.
        tool_use_id: ToolUseId,
        /// Whether execution was confirmed.
        confirmed: bool,
    },
    /// A recoverable error surfaced during streaming.
    Error {
        /// Human-readable error message.
        message: String,
    },
    /// An unrecoverable engine error; the execution is ending.
    EngineError {
        /// Human-readable error message.
        message: String,
    },
}

/// A streamed lifecycle event with its envelope fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Monotonic id within one execution.
    pub id: u64,
    /// The tick this event occurred in (0 before the first tick starts).
    pub tick: u32,
    /// Milliseconds since execution start.
    pub timestamp: DurationMs,
    /// The event payload.
    pub kind: StreamEventKind,
}

impl StreamEvent {
    /// Build a stream event with the given envelope and payload.
    pub fn new(id: u64, tick: u32, timestamp: DurationMs, kind: StreamEventKind) -> Self {
        Self { id, tick, timestamp, kind }
    }
}

/// Allocates monotonically increasing [`StreamEvent`] ids for one
/// execution's stream.
#[derive(Debug, Default)]
pub struct StreamEventIdAllocator(std::sync::atomic::AtomicU64);

impl StreamEventIdAllocator {
    /// Create a fresh allocator starting at 0.
    pub fn new() -> Self {
        Self(std::sync::atomic::AtomicU64::new(0))
    }

    /// Allocate the next id.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_event_ids_increase() {
        let alloc = StreamEventIdAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn serializes_with_tagged_kind() {
        let event = StreamEvent::new(
            0,
            1,
            DurationMs::ZERO,
            StreamEventKind::TickStart,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["kind"], "tick_start");
    }
}
