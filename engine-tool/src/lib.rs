#![deny(missing_docs)]
//! # engine-tool
//!
//! The `Tool` trait, its registry, and the two rendezvous coordinators
//! (tool confirmation, client-executed tool results) from `spec.md`
//! §4.7 and the external `Tool` interface in §6. Grounded in the
//! teacher's `ToolDyn`/`ToolRegistry` (`neuron-tool`), generalized with
//! an execution-type tag and a confirmation requirement.

pub mod coordinator;
pub mod error;
pub mod registry;
pub mod tool;

pub use coordinator::{ClientToolCoordinator, ConfirmationCoordinator, ConfirmationOutcome};
pub use error::ToolError;
pub use registry::ToolRegistry;
pub use tool::{ConfirmationRequirement, ExecutionType, Tool, ToolDefinition, ToolMetadata};
