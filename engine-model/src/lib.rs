#![deny(missing_docs)]
//! # engine-model
//!
//! The `ModelAdapter` boundary (`spec.md` §6): what the tick
//! orchestrator dispatches a tick's formatted input to, and the
//! engine-shaped response types it gets back. Concrete adapters
//! (Anthropic, OpenAI, Ollama, ...) are out of scope — only the
//! interface lives here.

pub mod adapter;
pub mod error;

pub use adapter::{
    EngineResponse, ModelAdapter, ModelCapabilities, ModelMetadata, ModelOptions, ModelStream, RoleMapping,
    StopReason, ToolCallRequest, Usage,
};
pub use error::ModelError;
