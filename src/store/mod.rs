//! Conversation persistence collaborator.
//!
//! The orchestration core consumes this trait; the relational schema behind
//! it lives elsewhere. `MemoryStore` backs tests and embedders.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::UsageRecord;

/// Entity category tag of a stored turn.
pub const KIND_HUMAN: &str = "human";
pub const KIND_AI: &str = "ai";
pub const KIND_AI_WITH_TOOLS: &str = "ai_with_tools";
pub const KIND_TOOL_RESULT: &str = "tool_result";

/// One durable conversation record. The payload is the canonical turn body;
/// nested tool-call records are part of the payload so they are created
/// atomically with their owning turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredTurn {
    pub conversation_id: String,
    pub role: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub complete: bool,
    pub created_at: DateTime<Utc>,
}

/// Durable store for conversation turns and usage records.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load all turns of a conversation in creation order.
    async fn load_turns(&self, conversation_id: &str) -> Result<Vec<StoredTurn>>;

    /// Append one turn (with any nested tool-call records) atomically.
    async fn append_turn(&self, turn: StoredTurn) -> Result<()>;

    /// Record one categorized usage entry.
    async fn append_usage(&self, record: UsageRecord) -> Result<()>;
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    turns: RwLock<HashMap<String, Vec<StoredTurn>>>,
    usage: RwLock<Vec<UsageRecord>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of recorded usage entries.
    pub async fn usage_records(&self) -> Vec<UsageRecord> {
        self.usage.read().await.clone()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn load_turns(&self, conversation_id: &str) -> Result<Vec<StoredTurn>> {
        Ok(self
            .turns
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_turn(&self, turn: StoredTurn) -> Result<()> {
        self.turns
            .write()
            .await
            .entry(turn.conversation_id.clone())
            .or_default()
            .push(turn);
        Ok(())
    }

    async fn append_usage(&self, record: UsageRecord) -> Result<()> {
        self.usage.write().await.push(record);
        Ok(())
    }
}
