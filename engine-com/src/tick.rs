//! Per-tick view handed to components during render (`spec.md` §3
//! "Tick State").

use engine_model::{StopReason, Usage};
use engine_types::Message;
use serde_json::Value;

/// The per-tick snapshot passed to every component's render call.
#[derive(Debug, Clone)]
pub struct TickState {
    /// 1-indexed tick number.
    pub tick: u64,
    /// What was sent to the model last tick (the formatted input),
    /// `None` on tick 1.
    pub previous: Option<Value>,
    /// What the model/tools produced this tick; seeded with the
    /// execution's `userInput` on tick 1.
    pub current: Option<Value>,
    /// Set by [`TickState::stop`] if a component requested an early
    /// stop during render.
    pub stop_reason: Option<StopReason>,
    /// Set if a render or lifecycle hook raised an error this tick.
    pub error: Option<String>,
    /// Token usage from the most recent model call, if any.
    pub usage: Option<Usage>,
    /// Messages that arrived during the previous tick, visible to
    /// this tick's components (`spec.md` §8's queued-message invariant).
    pub queued_messages: Vec<Message>,
}

impl TickState {
    /// Build the first tick's state, seeding `current` with the
    /// execution's original user input.
    pub fn first(user_input: Value) -> Self {
        Self {
            tick: 1,
            previous: None,
            current: Some(user_input),
            stop_reason: None,
            error: None,
            usage: None,
            queued_messages: Vec::new(),
        }
    }

    /// Build the next tick's state from this one's outcome.
    pub fn next(&self, formatted_sent: Value, queued_messages: Vec<Message>) -> Self {
        Self {
            tick: self.tick + 1,
            previous: Some(formatted_sent),
            current: None,
            stop_reason: None,
            error: None,
            usage: None,
            queued_messages,
        }
    }

    /// Record a component-requested early stop for this tick.
    pub fn stop(&mut self, reason: StopReason) {
        self.stop_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_seeds_current_with_user_input() {
        let state = TickState::first(Value::String("hi".into()));
        assert_eq!(state.tick, 1);
        assert_eq!(state.current, Some(Value::String("hi".into())));
        assert!(state.previous.is_none());
    }

    #[test]
    fn stop_records_reason() {
        let mut state = TickState::first(Value::Null);
        state.stop(StopReason { reason: "done".into(), description: None });
        assert!(state.stop_reason.is_some());
    }
}
