//! Run-scoped streaming state and the finalize-once flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::{ToolInvocation, Turn};

/// A tool call whose argument payload is still streaming in.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialToolCall {
    pub id: String,
    pub name: String,
    pub fragment: String,
}

/// Transient accumulators owned exclusively by one orchestration run.
///
/// Mutated only through the transition methods below, always from the run's
/// own callback sequence. Consumed (moved) by whichever terminal path wins,
/// so no mutation is observable after finalization.
#[derive(Debug)]
pub struct StreamingState {
    conversation_id: String,
    text: String,
    pending: Vec<PartialToolCall>,
    resolved: Vec<ToolInvocation>,
    completed: Vec<Turn>,
}

impl StreamingState {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            text: String::new(),
            pending: Vec::new(),
            resolved: Vec::new(),
            completed: Vec::new(),
        }
    }

    pub fn append_text(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    pub fn begin_call(&mut self, id: &str, name: &str) {
        self.pending.push(PartialToolCall {
            id: id.to_string(),
            name: name.to_string(),
            fragment: String::new(),
        });
    }

    pub fn extend_call(&mut self, id: &str, fragment: &str) {
        if let Some(call) = self.pending.iter_mut().find(|c| c.id == id) {
            call.fragment.push_str(fragment);
        }
    }

    /// Remove and return a call whose arguments finished streaming.
    pub fn take_call(&mut self, id: &str) -> Option<PartialToolCall> {
        let index = self.pending.iter().position(|c| c.id == id)?;
        Some(self.pending.remove(index))
    }

    /// Record a call whose arguments finished streaming but whose result is
    /// still outstanding. Held so a cancellation between argument completion
    /// and the step snapshot still captures the call; cleared when the
    /// owning step's assistant turn is snapshotted.
    pub fn note_resolved(&mut self, invocation: ToolInvocation) {
        self.resolved.push(invocation);
    }

    /// Step identifier for the tool-call governor: the number of turns
    /// accumulated so far. Calls issued within one round-trip share it;
    /// calls from a later round-trip see a larger value.
    pub fn step_key(&self) -> u64 {
        self.completed.len() as u64
    }

    /// Finish the current step: move the live text and the given
    /// invocations into a completed assistant turn and reset the
    /// accumulators for the next step.
    pub fn snapshot_step(&mut self, invocations: Vec<ToolInvocation>) {
        // The given invocations supersede the resolved-call holding area.
        self.resolved.clear();
        let text = std::mem::take(&mut self.text);
        if text.is_empty() && invocations.is_empty() {
            return;
        }
        self.completed
            .push(Turn::assistant(self.conversation_id.clone(), text, invocations));
    }

    pub fn push_turn(&mut self, turn: Turn) {
        self.completed.push(turn);
    }

    pub fn completed_turns(&self) -> &[Turn] {
        &self.completed
    }

    /// Terminal path for normal completion.
    pub fn into_completed(self) -> Vec<Turn> {
        self.completed
    }

    /// Terminal path for cancellation: merge the live accumulators with the
    /// completed steps. If any accumulator is non-empty, a partial assistant
    /// turn is synthesized: text first, then the calls whose arguments
    /// finished streaming, then one invocation per in-flight fragment. A
    /// fragment that is not valid structured data is carried through
    /// verbatim as an opaque string.
    pub fn freeze_partial(mut self) -> Vec<Turn> {
        if !self.text.is_empty() || !self.resolved.is_empty() || !self.pending.is_empty() {
            let mut invocations: Vec<ToolInvocation> = self.resolved.drain(..).collect();
            invocations.extend(self.pending.drain(..).map(|call| {
                let arguments = serde_json::from_str(&call.fragment)
                    .unwrap_or(serde_json::Value::String(call.fragment));
                ToolInvocation::new(call.id, call.name, arguments)
            }));
            let mut turn =
                Turn::assistant(self.conversation_id.clone(), self.text, invocations);
            turn.complete = false;
            self.completed.push(turn);
        }
        self.completed
    }
}

/// Exactly-once finalization for a run.
///
/// Whichever of {normal completion, cancellation} claims the flag first
/// performs the terminal persistence; the loser does nothing.
#[derive(Debug, Clone, Default)]
pub struct FinalizeFlag(Arc<AtomicBool>);

impl FinalizeFlag {
    /// Atomically claim the right to finalize. Returns false if some other
    /// path already finalized this run.
    pub fn try_claim(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_finalized(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeze_with_text_only_marks_incomplete() {
        let mut state = StreamingState::new("c1");
        state.append_text("hello");
        let turns = state.freeze_partial();
        assert_eq!(turns.len(), 1);
        assert!(!turns[0].complete);
        assert_eq!(turns[0].content, "hello");
        assert!(turns[0].invocations.is_empty());
    }

    #[test]
    fn freeze_keeps_invalid_fragment_verbatim() {
        let mut state = StreamingState::new("c1");
        state.begin_call("tc-1", "lookup");
        state.extend_call("tc-1", "{\"query\": \"unfini");
        let turns = state.freeze_partial();
        assert_eq!(
            turns[0].invocations[0].arguments,
            serde_json::Value::String("{\"query\": \"unfini".into())
        );
    }

    #[test]
    fn freeze_keeps_fully_streamed_calls() {
        let mut state = StreamingState::new("c1");
        state.append_text("Working");
        state.begin_call("tc-1", "lookup");
        state.extend_call("tc-1", "{\"q\": 1}");
        let call = state.take_call("tc-1").unwrap();
        let arguments: serde_json::Value = serde_json::from_str(&call.fragment).unwrap();
        state.note_resolved(ToolInvocation::new(call.id, call.name, arguments));

        let turns = state.freeze_partial();
        assert_eq!(turns.len(), 1);
        assert!(!turns[0].complete);
        assert_eq!(turns[0].content, "Working");
        assert_eq!(turns[0].invocations[0].id, "tc-1");
        assert_eq!(turns[0].invocations[0].arguments, serde_json::json!({"q": 1}));
    }

    #[test]
    fn snapshot_supersedes_resolved_calls() {
        let mut state = StreamingState::new("c1");
        let inv = ToolInvocation::new("tc-1", "lookup", serde_json::json!({}));
        state.note_resolved(inv.clone());
        state.snapshot_step(vec![inv]);

        // The call now lives in the snapshotted turn; freezing must not
        // duplicate it into a second partial turn.
        let turns = state.freeze_partial();
        assert_eq!(turns.len(), 1);
        assert!(turns[0].complete);
        assert_eq!(turns[0].invocations.len(), 1);
    }

    #[test]
    fn freeze_with_nothing_live_returns_completed_only() {
        let mut state = StreamingState::new("c1");
        state.push_turn(Turn::assistant("c1", "done", vec![]));
        let turns = state.freeze_partial();
        assert_eq!(turns.len(), 1);
        assert!(turns[0].complete);
    }

    #[test]
    fn step_key_grows_with_accumulated_turns() {
        let mut state = StreamingState::new("c1");
        assert_eq!(state.step_key(), 0);
        state.snapshot_step(vec![]); // empty step, no turn added
        assert_eq!(state.step_key(), 0);
        state.append_text("a");
        state.snapshot_step(vec![]);
        assert_eq!(state.step_key(), 1);
    }

    #[test]
    fn finalize_flag_claimed_once() {
        let flag = FinalizeFlag::default();
        assert!(flag.try_claim());
        assert!(!flag.try_claim());
        assert!(flag.is_finalized());
    }
}
