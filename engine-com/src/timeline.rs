//! The `timeline`: the ordered sequence of message/event entries a
//! model sees across ticks (`spec.md` §3).

use engine_types::{Message, Visibility};
use serde_json::Value;

/// Whether a [`TimelineEntry`] carries a conversational message or a
/// non-conversational lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineEntryKind {
    /// A normal conversational turn.
    Message,
    /// A lifecycle/recovery notice (e.g. an `onError` recovery message).
    Event,
}

/// One entry in the COM's `timeline`.
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    /// Message or event.
    pub kind: TimelineEntryKind,
    /// The underlying message.
    pub message: Message,
    /// Optional stable id.
    pub id: Option<String>,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Who can see this entry.
    pub visibility: Visibility,
    /// Free-form metadata.
    pub metadata: Value,
}

impl TimelineEntry {
    /// Build a plain conversational entry with default visibility/tags.
    pub fn message(message: Message) -> Self {
        Self {
            kind: TimelineEntryKind::Message,
            message,
            id: None,
            tags: Vec::new(),
            visibility: Visibility::Model,
            metadata: Value::Null,
        }
    }

    /// Build an `event`-kind entry (e.g. an error-recovery notice).
    pub fn event(message: Message) -> Self {
        Self { kind: TimelineEntryKind::Event, ..Self::message(message) }
    }
}
