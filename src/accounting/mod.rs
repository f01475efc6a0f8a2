//! Token usage accounting.

use crate::types::{RawUsage, UsageCategory, UsageRecord};

/// Converts raw gateway usage counters into categorized consumption
/// records. Pure: deterministic, no side effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenAccountant;

impl TokenAccountant {
    /// Build the records for one persisted turn. Absent or zero counters
    /// produce no record for their category.
    pub fn records(&self, usage: &RawUsage, model: &str, task: &str) -> Vec<UsageRecord> {
        let mut records = Vec::with_capacity(2);
        if usage.prompt_tokens > 0 {
            records.push(UsageRecord {
                category: UsageCategory::NonCachedInput,
                task: task.to_string(),
                count: usage.prompt_tokens,
                model: model.to_string(),
            });
        }
        if usage.completion_tokens > 0 {
            records.push(UsageRecord {
                category: UsageCategory::Completion,
                task: task.to_string(),
                count: usage.completion_tokens,
                model: model.to_string(),
            });
        }
        records
    }
}
