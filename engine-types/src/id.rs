//! Typed identifier wrappers used throughout the engine.
//!
//! Plain `String`/`u64` ids are easy to swap by accident (a pid where a
//! trace id belongs). These newtypes make the mistake a type error
//! instead of a runtime surprise.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a fiber within a single execution's tree.
///
/// Monotonically increasing within one reconciler instance; not
/// globally unique and not stable across executions.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FiberId(pub u64);

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fiber-{}", self.0)
    }
}

/// Monotonic allocator for [`FiberId`]s, one per reconciler.
#[derive(Debug, Default)]
pub struct FiberIdAllocator(AtomicU64);

impl FiberIdAllocator {
    /// Create a fresh allocator starting at 0.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Allocate the next [`FiberId`].
    pub fn next(&self) -> FiberId {
        FiberId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

macro_rules! typed_string_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new id from anything that converts to `String`.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh id using a random UUID v4.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_string_id!(ToolUseId, "Identifies one tool-use request/result pair.");
typed_string_id!(TraceId, "Correlation id carried across fork/spawn children.");
typed_string_id!(RefName, "Name a component publishes itself under in the COM ref table.");
typed_string_id!(SectionId, "Stable id for a COM section.");

/// Unique identifier for an execution handle (root, fork, or spawn).
///
/// Pids are process-local and monotonically increasing, scoped to one
/// [`crate::id::PidAllocator`] (one per top-level execution root).
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(pub u64);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid-{}", self.0)
    }
}

/// Monotonic allocator for [`Pid`]s, shared by a root execution and all
/// of its fork/spawn descendants.
#[derive(Debug, Default)]
pub struct PidAllocator(AtomicU64);

impl PidAllocator {
    /// Create a fresh allocator starting at 0.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Allocate the next [`Pid`].
    pub fn next(&self) -> Pid {
        Pid(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fiber_ids_increase_monotonically() {
        let alloc = FiberIdAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        assert!(b.0 > a.0);
    }

    #[test]
    fn pid_display() {
        assert_eq!(Pid(3).to_string(), "pid-3");
    }

    #[test]
    fn tool_use_id_roundtrip() {
        let id = ToolUseId::new("abc");
        assert_eq!(id.as_str(), "abc");
        assert_eq!(id.to_string(), "abc");
    }
}
