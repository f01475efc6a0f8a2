//! Convenience re-exports for common use.

pub use crate::config::MaestroConfig;
pub use crate::error::{MaestroError, Result};
pub use crate::gateway::{
    GatewayRequest, GatewayResolver, ModelGateway, ReasoningEffort, ToolDefinition,
};
pub use crate::history::HistoryLoader;
pub use crate::orchestrator::{AgentConfiguration, OrchestrationStream, StepRunner};
pub use crate::persist::MessagePersister;
pub use crate::store::{ConversationStore, MemoryStore, StoredTurn};
pub use crate::tools::{ToolDescriptor, ToolExecutionGovernor, ToolRegistry};
pub use crate::types::{
    GatewayEvent, RawUsage, Role, ToolInvocation, Turn, UsageCategory, UsageRecord,
    ValidationState,
};
