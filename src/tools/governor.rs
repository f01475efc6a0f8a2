//! Per-step admission control over tool execution.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use super::ToolDescriptor;

/// Wraps tool executors with a per-step parallel-call ceiling and
/// error-to-result conversion.
///
/// The step key is a monotonically non-decreasing marker shared by every
/// call the model requests within one generation step. The N-th call within
/// a step is admitted only while N is at or below the ceiling; calls beyond
/// it receive a textual retry instruction and the real executor never runs.
/// Executor failures come back as textual tool output, never as errors;
/// a misbehaving tool cannot terminate the run.
pub struct ToolExecutionGovernor {
    limit: usize,
    admitted: Mutex<HashMap<u64, usize>>,
}

impl ToolExecutionGovernor {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            admitted: Mutex::new(HashMap::new()),
        }
    }

    /// Execute `tool` with `args` under the ceiling for `step_key`.
    ///
    /// Always returns a result value suitable for feeding back to the model.
    pub async fn execute(
        &self,
        step_key: u64,
        tool: &ToolDescriptor,
        args: serde_json::Value,
    ) -> serde_json::Value {
        let admitted = {
            let mut counters = self.admitted.lock().unwrap();
            let count = counters.entry(step_key).or_insert(0);
            *count += 1;
            *count <= self.limit
        };

        if !admitted {
            debug!(tool = %tool.name, step_key, "tool call rejected by parallel ceiling");
            return serde_json::Value::String(format!(
                "The call to '{}' was not executed: the parallel tool call limit of {} \
                 for this step was already reached. Issue the call again in a later step.",
                tool.name, self.limit
            ));
        }

        match tool.invoke(args).await {
            Ok(value) => value,
            Err(err) => {
                debug!(tool = %tool.name, %err, "tool executor failed");
                serde_json::json!({
                    "error": format!("Tool '{}' failed: {err}", tool.name),
                })
            }
        }
    }
}
