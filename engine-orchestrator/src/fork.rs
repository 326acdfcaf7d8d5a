//! Options controlling what a `fork`/`spawn` child inherits from its
//! parent (`spec.md` §4.6).

/// How a child execution's timeline/sections start out relative to
/// its parent's.
///
/// `spec.md` describes a `copy`/`reference` distinction borrowed from
/// the source's by-reference object semantics. In this crate every
/// [`engine_com::ContextObjectModel`] is owned outright by its own
/// session (`spec.md` §5's "the COM is owned by its session; no
/// sharing across sessions"), so true live-reference sharing between
/// two independently-ticking COMs is not just undesirable but
/// contradicts that resource policy. Both variants are therefore
/// implemented as a deep clone of the parent's entries at fork time —
/// `Reference` exists so callers can name the option the spec
/// describes, and is kept distinct from `Copy` only for that
/// documentation purpose (see `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InheritMode {
    /// Start empty; do not inherit.
    #[default]
    None,
    /// Start with a snapshot of the parent's current entries.
    Copy,
    /// Accepted for parity with `spec.md`'s vocabulary; behaves
    /// identically to `Copy` (see type-level docs).
    Reference,
}

/// Whether a child carries its parent's trace id or starts a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceInherit {
    /// Reuse the parent's `TraceId`.
    Carry,
    /// Generate a fresh `TraceId`.
    Fresh,
}

/// Options for [`crate::session::Session::fork`].
#[derive(Debug, Clone)]
pub struct ForkOptions {
    /// How the fork's initial timeline relates to the parent's.
    pub timeline: InheritMode,
    /// How the fork's initial sections relate to the parent's.
    pub sections: InheritMode,
    /// Trace id inheritance.
    pub trace: TraceInherit,
    /// Whether to carry the parent's shared `state`/metadata into the
    /// fork's COM.
    pub carry_context: bool,
}

impl Default for ForkOptions {
    fn default() -> Self {
        Self { timeline: InheritMode::Copy, sections: InheritMode::Copy, trace: TraceInherit::Carry, carry_context: true }
    }
}

/// Options for [`crate::session::Session::spawn`]. Unlike
/// [`ForkOptions`], defaults do not carry trace id or context —
/// `spec.md` §4.6: "do not inherit hooks or trace unless opts
/// request it."
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// How the spawn's initial timeline relates to the parent's.
    pub timeline: InheritMode,
    /// How the spawn's initial sections relate to the parent's.
    pub sections: InheritMode,
    /// Trace id inheritance.
    pub trace: TraceInherit,
    /// Whether to carry the parent's shared `state`/metadata into the
    /// spawn's COM.
    pub carry_context: bool,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self { timeline: InheritMode::None, sections: InheritMode::None, trace: TraceInherit::Fresh, carry_context: false }
    }
}
