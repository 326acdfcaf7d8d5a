#![deny(missing_docs)]
//! # engine-com
//!
//! The Context Object Model: the mutable semantic state a tree of
//! components builds up each tick — timeline, sections, ephemeral
//! content, tools, shared state, tick control, abort, and a typed
//! event bus (`spec.md` §3/§4.4).
//!
//! This crate owns the data model only. Turning a reconciler pass's
//! [`engine_fiber::CompiledStructure`] into mutations on a
//! [`com::ContextObjectModel`] is `engine-render`'s job; driving ticks
//! to completion is `engine-orchestrator`'s.

pub mod com;
pub mod control;
pub mod ephemeral;
pub mod error;
pub mod events;
pub mod section;
pub mod tick;
pub mod timeline;

pub use com::{coalesce_blocks, ContextObjectModel};
pub use control::{ControlRequest, ControlStatus};
pub use ephemeral::{coalesce_text, EphemeralEntry};
pub use error::ComError;
pub use events::{ComEvent, EventBus, ProcedurePhase};
pub use section::Section;
pub use tick::TickState;
pub use timeline::{TimelineEntry, TimelineEntryKind};
