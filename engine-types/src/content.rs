//! Universal content types that cross every boundary: timeline entries,
//! sections, ephemeral entries, and tool results are all built from
//! [`ContentBlock`]s.

use serde::{Deserialize, Serialize};

/// The role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A human (or upstream caller) message.
    User,
    /// An assistant/model message.
    Assistant,
    /// A tool-result message.
    Tool,
    /// A non-conversational lifecycle/event entry (recovery notices,
    /// ephemeral-derived timeline entries, etc).
    Event,
    /// A system message. Never appears in `timeline` directly — routed
    /// to the COM's `systemMessages` buffer (see [`crate::error`] docs
    /// and the engine-com crate for the consolidation rule).
    System,
}

/// A single block of structured content. Mirrors the modalities named
/// in the external model-adapter interface.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// An image.
    Image {
        /// Where the image data comes from.
        source: MediaSource,
        /// MIME type, e.g. `"image/png"`.
        media_type: String,
    },
    /// An arbitrary document (PDF, plain text file, ...).
    Document {
        /// Where the document data comes from.
        source: MediaSource,
        /// MIME type, e.g. `"application/pdf"`.
        media_type: String,
    },
    /// An audio clip.
    Audio {
        /// Where the audio data comes from.
        source: MediaSource,
        /// MIME type, e.g. `"audio/wav"`.
        media_type: String,
    },
    /// A video clip.
    Video {
        /// Where the video data comes from.
        source: MediaSource,
        /// MIME type, e.g. `"video/mp4"`.
        media_type: String,
    },
    /// A block of source code.
    Code {
        /// The code text.
        code: String,
        /// Language hint for rendering (e.g. `"rust"`), if known.
        language: Option<String>,
    },
    /// Structured JSON content, passed through renderers unchanged.
    Json {
        /// The JSON value.
        value: serde_json::Value,
    },
    /// A model-emitted tool invocation request.
    ToolUse {
        /// Identifies this call; matched by [`ContentBlock::ToolResult::tool_use_id`].
        id: String,
        /// Name of the tool to invoke.
        name: String,
        /// Tool input parameters.
        input: serde_json::Value,
    },
    /// The result of executing a tool call.
    ToolResult {
        /// The `id` of the corresponding [`ContentBlock::ToolUse`].
        tool_use_id: String,
        /// Result content blocks (kept nested rather than flattened so
        /// a tool can return images/documents as part of its result).
        content: Vec<ContentBlock>,
        /// Whether the tool call errored (including confirmation denial).
        is_error: bool,
    },
    /// Extended/chain-of-thought reasoning content, if the model
    /// adapter surfaces it.
    Reasoning {
        /// The reasoning text.
        text: String,
    },
    /// A record of an out-of-band user action (e.g. a UI click),
    /// injected as context rather than spoken content.
    UserAction {
        /// Free-form action identifier.
        action: String,
        /// Action payload.
        data: serde_json::Value,
    },
    /// A system-level event surfaced into context (not the same as a
    /// `timeline` entry with `kind = event` — this is content *within*
    /// an entry, e.g. a lifecycle notice rendered inline).
    SystemEvent {
        /// Event name.
        name: String,
        /// Event payload.
        data: serde_json::Value,
    },
    /// A snapshot of a state change, used by components that want the
    /// model to see "state X changed from A to B" as context.
    StateChange {
        /// The state key that changed.
        key: String,
        /// Previous value, if any.
        previous: Option<serde_json::Value>,
        /// New value.
        value: serde_json::Value,
    },
}

/// Source for binary media content blocks (image/document/audio/video).
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaSource {
    /// Base64-encoded inline data.
    Base64 {
        /// The base64-encoded payload.
        data: String,
    },
    /// A URL the model adapter/renderer is expected to fetch or
    /// reference directly.
    Url {
        /// The URL.
        url: String,
    },
}

impl ContentBlock {
    /// Construct a text block.
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }

    /// `Some(text)` if this block is (or reduces to) plain text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Code { code, .. } => Some(code),
            ContentBlock::Reasoning { text } => Some(text),
            _ => None,
        }
    }

    /// Whether this block type should always pass through a renderer
    /// unchanged rather than being reformatted (native media/content
    /// that isn't text to be wrapped).
    pub fn is_native_passthrough(&self) -> bool {
        matches!(
            self,
            ContentBlock::Image { .. }
                | ContentBlock::Document { .. }
                | ContentBlock::Audio { .. }
                | ContentBlock::Video { .. }
                | ContentBlock::Json { .. }
        )
    }
}

/// Visibility of a timeline entry or section: who is allowed to see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Sent to the model.
    Model,
    /// Visible to human/UI observers but not sent to the model.
    Observer,
    /// Log-only; neither model nor observer sees it in-band.
    Log,
}

/// A message: one participant's turn, made of content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who said it.
    pub role: Role,
    /// The content blocks making up the message.
    pub content: Vec<ContentBlock>,
    /// Optional stable id (e.g. for referencing from a tool result).
    pub id: Option<String>,
    /// Free-form metadata.
    pub metadata: Option<serde_json::Value>,
    /// Creation timestamp.
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Last-update timestamp (messages can be amended in place).
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Message {
    /// Build a message with only the required fields set.
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content,
            id: None,
            metadata: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Build a single-text-block user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::text(text)])
    }

    /// Build a single-text-block assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentBlock::text(text)])
    }

    /// Build a single-text-block system message. Callers in the COM
    /// layer MUST route this to the `systemMessages` buffer, never to
    /// `timeline` — see `spec.md` §9's resolution of the source's
    /// ambiguity here.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentBlock::text(text)])
    }

    /// Concatenate all text-bearing blocks, separated by newlines.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_is_single_text_block() {
        let msg = Message::user("hi");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text_content(), "hi");
    }

    #[test]
    fn native_blocks_are_passthrough() {
        let img = ContentBlock::Image {
            source: MediaSource::Url { url: "x".into() },
            media_type: "image/png".into(),
        };
        assert!(img.is_native_passthrough());
        assert!(!ContentBlock::text("hi").is_native_passthrough());
    }

    #[test]
    fn tool_result_nests_content_blocks() {
        let result = ContentBlock::ToolResult {
            tool_use_id: "1".into(),
            content: vec![ContentBlock::text("ok")],
            is_error: false,
        };
        match result {
            ContentBlock::ToolResult { content, is_error, .. } => {
                assert!(!is_error);
                assert_eq!(content.len(), 1);
            }
            _ => panic!("expected tool result"),
        }
    }
}
