//! Incremental events yielded by a model gateway stream.

use serde::{Deserialize, Serialize};

use super::usage::RawUsage;

/// One event in a gateway's incremental stream.
///
/// This is also the client-facing frame payload: the orchestrator relays
/// events to the byte stream in this encoding without re-framing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Incremental assistant text.
    TextDelta { text: String },
    /// The model announced a new tool call.
    ToolCallBegin { id: String, name: String },
    /// A fragment of a tool call's argument payload.
    ToolCallDelta { id: String, fragment: String },
    /// A tool call's arguments are fully accumulated.
    ToolCallComplete { id: String },
    /// Token usage reported by the gateway (may arrive more than once per
    /// step; counters are merged).
    Usage { usage: RawUsage },
    /// The current generation step finished with tool calls outstanding.
    StepFinished,
    /// The model signalled the run is complete.
    RunFinished,
    /// Terminal error frame.
    Error { message: String },
}
