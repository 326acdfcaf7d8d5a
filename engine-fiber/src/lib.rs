#![deny(missing_docs)]
//! # engine-fiber
//!
//! The fiber-based reconciler and per-fiber hook runtime (`spec.md`
//! §4.1/§4.2): tree diffing, keyed reconciliation, the hook chain, and
//! the intrinsic-tag structure collector that feeds `engine-render`.
//!
//! This crate knows nothing about the concrete Context Object Model —
//! it only depends on the minimal [`hook::Com`] seam — so it can be
//! tested and reused independently of `engine-com`, mirroring how the
//! teacher keeps its reconciliation/runtime layer (`layer0`) free of
//! any concrete state-store dependency.

pub mod commit;
pub mod effect;
pub mod element;
pub mod error;
pub mod fiber;
pub mod hook;
pub mod reconcile;
pub mod structure;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use commit::{fire_on_error, fire_phase_over_tree, render_and_commit};
pub use effect::EffectSchedule;
pub use element::{
    ClassComponent, ClassComponentFactory, Element, ElementType, FunctionComponent, IntrinsicTag, Node, RecoveryAction,
};
pub use error::{HookError, RenderError};
pub use fiber::{FiberNode, FiberTree, Flags};
pub use hook::{Com, Deps, Dispatcher, EffectPhase, RenderCx, UpdateQueue};
pub use reconcile::{reconcile_children, ReconcileResult};
pub use structure::{
    CompiledEphemeral, CompiledSection, CompiledStructure, CompiledTimelineEntry, CompiledTool, EphemeralPosition,
    SectionContent, SystemMessageItem, SystemMessageSource,
};
