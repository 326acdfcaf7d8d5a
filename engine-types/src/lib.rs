#![deny(missing_docs)]
//! # engine-types
//!
//! Shared content, message, id, error-classification, and streaming
//! types used across the agent execution engine's crates. No
//! behavior lives here — just the vocabulary every other crate builds
//! on, mirroring how the teacher stack keeps a small, dependency-light
//! foundation crate beneath its protocol traits.

pub mod content;
pub mod duration;
pub mod error;
pub mod id;
pub mod stream;

pub use content::{ContentBlock, MediaSource, Message, Role, Visibility};
pub use duration::DurationMs;
pub use error::{Classify, ErrorCategory};
pub use id::{FiberId, FiberIdAllocator, Pid, PidAllocator, RefName, SectionId, TraceId, ToolUseId};
pub use stream::{StreamEvent, StreamEventIdAllocator, StreamEventKind};
