#![deny(missing_docs)]
//! # engine-orchestrator
//!
//! The tick orchestrator (`spec.md` §4.5): the per-execution phase
//! machine driving Starting -> Compiling -> Awaiting-Forks -> Applying
//! -> Model -> Tools -> Ingesting -> Ended, plus the execution graph
//! and fork/spawn/signal process model from §4.6 and the confirmation
//! rendezvous wiring from §4.7.
//!
//! This crate is the top of the dependency stack: it depends on
//! `engine-fiber`, `engine-com`, `engine-render`, `engine-tool`, and
//! `engine-model`, and is itself depended on by nothing else in the
//! workspace except the `engine` umbrella crate.

pub mod config;
pub mod error;
pub mod fork;
pub mod graph;
pub mod handle;
pub mod lifecycle;
pub mod session;

pub use config::{SessionConfig, DEFAULT_MAX_COMPILE_ITERATIONS, MAX_COMPILE_ITERATIONS_HARD_CAP};
pub use error::OrchestratorError;
pub use fork::{ForkOptions, InheritMode, SpawnOptions, TraceInherit};
pub use graph::{ExecutionGraph, ExecutionTreeNode};
pub use handle::{ExecutionHandle, ExecutionKind, ExecutionStatus};
pub use lifecycle::{LifecycleListener, LifecycleNotice};
pub use session::{ExecutionSnapshot, Persistence, RootComponent, Session};
