//! Token usage counters and categorized consumption records.

use serde::{Deserialize, Serialize};

/// Raw usage counters as reported by a model gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RawUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl RawUsage {
    /// Merge another usage into this one (accumulate).
    pub fn merge(&mut self, other: &RawUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }

    pub fn is_empty(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0
    }
}

/// Consumption category of a usage record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UsageCategory {
    NonCachedInput,
    Completion,
}

/// One categorized consumption record. Created once per persisted turn,
/// never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageRecord {
    pub category: UsageCategory,
    pub task: String,
    pub count: u32,
    pub model: String,
}
