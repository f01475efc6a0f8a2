//! Conversation history loading.

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::error::{MaestroError, Result};
use crate::store::{ConversationStore, StoredTurn};
use crate::types::{Role, ToolInvocation, Turn, ValidationState};

/// Loads prior turns for a conversation and converts each into the
/// canonical form the model gateway expects.
pub struct HistoryLoader {
    store: Arc<dyn ConversationStore>,
}

impl HistoryLoader {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Load the ordered turn sequence for a conversation.
    ///
    /// A stored record that cannot be decoded is skipped with a diagnostic;
    /// one corrupt row must not make the conversation unusable.
    pub async fn load(&self, conversation_id: &str) -> Result<Vec<Turn>> {
        let stored = self.store.load_turns(conversation_id).await?;
        let mut turns = Vec::with_capacity(stored.len());
        for record in stored {
            match decode_stored(&record) {
                Ok(turn) => turns.push(turn),
                Err(err) => {
                    warn!(
                        conversation_id,
                        role = %record.role,
                        %err,
                        "skipping undecodable stored turn"
                    );
                }
            }
        }
        Ok(turns)
    }
}

#[derive(Deserialize)]
struct MessagePayload {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<StoredToolCall>,
}

#[derive(Deserialize)]
struct StoredToolCall {
    id: String,
    name: String,
    /// Serialized argument payload; kept verbatim when not valid JSON.
    arguments: String,
    #[serde(default)]
    validation: ValidationState,
}

#[derive(Deserialize)]
struct ToolResultPayload {
    tool_call_id: String,
    #[serde(default)]
    name: String,
    result: serde_json::Value,
}

/// Decode one stored record into a canonical turn.
pub fn decode_stored(record: &StoredTurn) -> Result<Turn> {
    let role = match record.role.as_str() {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        "tool_result" => Role::ToolResult,
        other => {
            return Err(MaestroError::HistoryDecode(format!(
                "unknown role '{other}'"
            )))
        }
    };

    match role {
        Role::User | Role::Assistant => {
            let payload: MessagePayload = serde_json::from_value(record.payload.clone())
                .map_err(|e| MaestroError::HistoryDecode(e.to_string()))?;
            let invocations = payload
                .tool_calls
                .into_iter()
                .map(|tc| {
                    let arguments = serde_json::from_str(&tc.arguments)
                        .unwrap_or(serde_json::Value::String(tc.arguments));
                    let mut inv = ToolInvocation::new(tc.id, tc.name, arguments);
                    inv.validation = tc.validation;
                    inv
                })
                .collect();
            Ok(Turn {
                role,
                content: payload.content,
                invocations,
                complete: record.complete,
                created_at: record.created_at,
                conversation_id: record.conversation_id.clone(),
            })
        }
        Role::ToolResult => {
            let payload: ToolResultPayload = serde_json::from_value(record.payload.clone())
                .map_err(|e| MaestroError::HistoryDecode(e.to_string()))?;
            let mut turn = Turn::tool_result(
                record.conversation_id.clone(),
                payload.tool_call_id,
                payload.name,
                payload.result,
            );
            turn.created_at = record.created_at;
            Ok(turn)
        }
    }
}
