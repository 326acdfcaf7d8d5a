#![deny(missing_docs)]
//! # engine — umbrella crate
//!
//! Single import surface for the agent execution engine: the
//! reconciler + hook runtime ([`engine_fiber`]), the Context Object
//! Model ([`engine_com`]), the structure renderer ([`engine_render`]),
//! tools and their rendezvous coordinators ([`engine_tool`]), the
//! model-adapter boundary ([`engine_model`]), and — behind the
//! `orchestrator` feature — the tick orchestrator, execution graph,
//! and fork/spawn process model ([`engine_orchestrator`]).
//!
//! Mirrors the teacher's `neuron` umbrella crate: a thin re-export
//! layer plus a [`prelude`] for the happy path, so downstream crates
//! depend on one name instead of wiring up the whole workspace.

#[cfg(feature = "core")]
pub use engine_com;
#[cfg(feature = "core")]
pub use engine_fiber;
#[cfg(feature = "core")]
pub use engine_model;
#[cfg(feature = "orchestrator")]
pub use engine_orchestrator;
#[cfg(feature = "core")]
pub use engine_render;
#[cfg(feature = "core")]
pub use engine_tool;
#[cfg(feature = "core")]
pub use engine_types;

/// Happy-path imports for building and driving an execution.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use engine_types::{ContentBlock, Message, Pid, Role, TraceId, Visibility};

    #[cfg(feature = "core")]
    pub use engine_fiber::{Element, ElementType, IntrinsicTag, Node};

    #[cfg(feature = "core")]
    pub use engine_com::{ContextObjectModel, Section, TickState};

    #[cfg(feature = "core")]
    pub use engine_render::{RendererRegistry, Resolver};

    #[cfg(feature = "core")]
    pub use engine_tool::{Tool, ToolDefinition, ToolMetadata};

    #[cfg(feature = "core")]
    pub use engine_model::{EngineResponse, ModelAdapter};

    #[cfg(feature = "orchestrator")]
    pub use engine_orchestrator::{ExecutionGraph, ExecutionHandle, RootComponent, Session, SessionConfig};
}
