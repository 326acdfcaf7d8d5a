//! Lifecycle phases and the per-tick effect schedule.
//!
//! Most of the effect machinery (the cells themselves, dependency
//! comparison) lives in [`crate::hook`] next to the hooks that create
//! them; this module holds the commit-time schedule that groups
//! pending effects by phase so `compile.rs`/`commit.rs` can fire them
//! at the right lifecycle point.

use std::collections::HashMap;

use engine_types::FiberId;

use crate::hook::{EffectPhase, PendingEffect};

/// All effects scheduled across one render pass, grouped by the
/// fiber that produced them. Commit walks fibers in DFS order and
/// looks up each fiber's entry here to fire effects matching the
/// current phase.
#[derive(Default)]
pub struct EffectSchedule {
    by_fiber: HashMap<FiberId, Vec<PendingEffect>>,
}

impl EffectSchedule {
    /// An empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the effects produced by one fiber's render.
    pub fn insert(&mut self, fiber: FiberId, effects: Vec<PendingEffect>) {
        if !effects.is_empty() {
            self.by_fiber.insert(fiber, effects);
        }
    }

    /// Run every `should_run` effect for `fiber` matching `phase`,
    /// returning the cleanups they produced keyed by hook index so
    /// the caller can store them back onto the fiber's hook chain.
    pub fn fire(&mut self, fiber: FiberId, phase: EffectPhase) -> Vec<(usize, Option<Box<dyn FnOnce() + Send>>)> {
        let Some(effects) = self.by_fiber.remove(&fiber) else {
            return Vec::new();
        };
        let mut results = Vec::new();
        let mut remaining = Vec::new();
        for effect in effects {
            if effect.phase == phase {
                let PendingEffect { index, should_run, create, .. } = effect;
                if should_run {
                    results.push((index, create()));
                }
            } else {
                remaining.push(effect);
            }
        }
        if !remaining.is_empty() {
            self.by_fiber.insert(fiber, remaining);
        }
        results
    }

    /// Whether any fiber still has unfired effects queued (used to
    /// assert the schedule drained cleanly after a tick).
    pub fn is_empty(&self) -> bool {
        self.by_fiber.values().all(|v| v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_only_returns_matching_phase() {
        let mut schedule = EffectSchedule::new();
        let fiber = FiberId(7);
        schedule.insert(
            fiber,
            vec![
                PendingEffect {
                    index: 0,
                    phase: EffectPhase::Mount,
                    should_run: true,
                    create: Box::new(|| None),
                },
                PendingEffect {
                    index: 1,
                    phase: EffectPhase::TickEnd,
                    should_run: true,
                    create: Box::new(|| None),
                },
            ],
        );
        let mounted = schedule.fire(fiber, EffectPhase::Mount);
        assert_eq!(mounted.len(), 1);
        assert_eq!(mounted[0].0, 0);
        let tick_end = schedule.fire(fiber, EffectPhase::TickEnd);
        assert_eq!(tick_end.len(), 1);
        assert_eq!(tick_end[0].0, 1);
    }

    #[test]
    fn should_run_false_is_skipped() {
        let mut schedule = EffectSchedule::new();
        let fiber = FiberId(8);
        schedule.insert(
            fiber,
            vec![PendingEffect {
                index: 0,
                phase: EffectPhase::Mount,
                should_run: false,
                create: Box::new(|| panic!("should not run")),
            }],
        );
        let mounted = schedule.fire(fiber, EffectPhase::Mount);
        assert!(mounted.is_empty());
    }
}
