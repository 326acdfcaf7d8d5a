#![deny(missing_docs)]
//! # engine-render
//!
//! Turns one reconciliation pass's
//! [`engine_fiber::CompiledStructure`] into mutations on a
//! [`engine_com::ContextObjectModel`], per `spec.md` §4.3's renderer
//! resolution and application rules.

pub mod apply;
pub mod renderer;

pub use apply::{apply_structure, Resolver};
pub use renderer::{PlainRenderer, Renderer, RendererRegistry};
