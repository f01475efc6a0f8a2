//! Core data model shared across the orchestration engine.

pub mod stream;
pub mod turn;
pub mod usage;

pub use stream::GatewayEvent;
pub use turn::{AssistantKind, Role, ToolInvocation, Turn, ValidationState};
pub use usage::{RawUsage, UsageCategory, UsageRecord};
