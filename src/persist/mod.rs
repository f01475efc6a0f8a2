//! Turning run output into durable records.

use std::sync::Arc;

use tracing::{debug, error};

use crate::accounting::TokenAccountant;
use crate::error::{MaestroError, Result};
use crate::store::{
    ConversationStore, StoredTurn, KIND_AI, KIND_AI_WITH_TOOLS, KIND_HUMAN, KIND_TOOL_RESULT,
};
use crate::types::{AssistantKind, RawUsage, Role, Turn};

/// Encode one canonical turn as a durable record.
///
/// Nested tool-call records live inside the payload so they are written
/// atomically with their owning turn. Tool-call arguments are stored in
/// serialized form.
pub fn encode_turn(turn: &Turn) -> StoredTurn {
    let (role, kind, payload) = match turn.role {
        Role::User => (
            "user",
            KIND_HUMAN,
            serde_json::json!({ "content": turn.content }),
        ),
        Role::Assistant => {
            let kind = match turn.assistant_kind() {
                Some(AssistantKind::WithTools) => KIND_AI_WITH_TOOLS,
                _ => KIND_AI,
            };
            let tool_calls: Vec<serde_json::Value> = turn
                .invocations
                .iter()
                .map(|inv| {
                    serde_json::json!({
                        "id": inv.id,
                        "name": inv.name,
                        "arguments": serialize_arguments(&inv.arguments),
                        "validation": inv.validation,
                    })
                })
                .collect();
            let payload = serde_json::json!({
                "content": turn.content,
                "tool_calls": tool_calls,
            });
            ("assistant", kind, payload)
        }
        Role::ToolResult => {
            let inv = turn.invocations.first();
            let payload = serde_json::json!({
                "tool_call_id": inv.map(|i| i.id.as_str()).unwrap_or_default(),
                "name": inv.map(|i| i.name.as_str()).unwrap_or_default(),
                "result": inv.and_then(|i| i.result.clone()).unwrap_or(serde_json::Value::Null),
            });
            ("tool_result", KIND_TOOL_RESULT, payload)
        }
    };

    StoredTurn {
        conversation_id: turn.conversation_id.clone(),
        role: role.to_string(),
        kind: kind.to_string(),
        payload,
        // Tool results and user turns are atomic; only assistant turns can
        // carry a cancellation-produced partial flag.
        complete: match turn.role {
            Role::Assistant => turn.complete,
            _ => true,
        },
        created_at: turn.created_at,
    }
}

/// An argument fragment captured mid-stream is already a plain string; keep
/// it verbatim instead of double-encoding it.
fn serialize_arguments(arguments: &serde_json::Value) -> String {
    match arguments {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Converts a finished or partial run into durable records and attaches
/// usage accounting.
pub struct MessagePersister {
    store: Arc<dyn ConversationStore>,
    accountant: TokenAccountant,
}

impl MessagePersister {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self {
            store,
            accountant: TokenAccountant,
        }
    }

    /// Persist a normally completed run. Errors propagate: silently losing
    /// a completed answer is worse than an explicit failure.
    pub async fn persist_run(
        &self,
        turns: &[Turn],
        usage: &RawUsage,
        model: &str,
        task: &str,
    ) -> Result<()> {
        for turn in turns {
            self.store
                .append_turn(encode_turn(turn))
                .await
                .map_err(|e| MaestroError::Persistence(e.to_string()))?;
        }

        let has_assistant = turns.iter().any(|t| t.role == Role::Assistant);
        if has_assistant && !usage.is_empty() {
            for record in self.accountant.records(usage, model, task) {
                self.store
                    .append_usage(record)
                    .await
                    .map_err(|e| MaestroError::Persistence(e.to_string()))?;
            }
        }

        debug!(turns = turns.len(), model, "run persisted");
        Ok(())
    }

    /// Persist a cancellation-captured run. Failures are logged and
    /// swallowed: the connection is already torn down and nothing can
    /// consume a re-raised error.
    pub async fn persist_cancelled(
        &self,
        turns: &[Turn],
        usage: &RawUsage,
        model: &str,
        task: &str,
    ) {
        if let Err(err) = self.persist_run(turns, usage, model, task).await {
            error!(%err, "failed to persist cancelled run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolInvocation;

    #[test]
    fn user_turn_is_always_complete() {
        let stored = encode_turn(&Turn::user("c1", "hello"));
        assert_eq!(stored.kind, KIND_HUMAN);
        assert!(stored.complete);
    }

    #[test]
    fn assistant_kind_tags() {
        let plain = encode_turn(&Turn::assistant("c1", "hi", vec![]));
        assert_eq!(plain.kind, KIND_AI);

        let with_tools = encode_turn(&Turn::assistant(
            "c1",
            "",
            vec![ToolInvocation::new("tc-1", "lookup", serde_json::json!({"q": 1}))],
        ));
        assert_eq!(with_tools.kind, KIND_AI_WITH_TOOLS);
        assert_eq!(
            with_tools.payload["tool_calls"][0]["arguments"],
            "{\"q\":1}"
        );
    }

    #[test]
    fn partial_assistant_keeps_incomplete_flag() {
        let mut turn = Turn::assistant("c1", "half an ans", vec![]);
        turn.complete = false;
        assert!(!encode_turn(&turn).complete);
    }

    #[test]
    fn opaque_fragment_stored_verbatim() {
        let turn = Turn::assistant(
            "c1",
            "",
            vec![ToolInvocation::new(
                "tc-1",
                "lookup",
                serde_json::Value::String("{\"q\": \"tr".into()),
            )],
        );
        let stored = encode_turn(&turn);
        assert_eq!(stored.payload["tool_calls"][0]["arguments"], "{\"q\": \"tr");
    }
}
