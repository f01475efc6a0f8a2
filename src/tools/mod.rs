//! Tool descriptors, registry, and execution governance.

pub mod governor;

pub use governor::ToolExecutionGovernor;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{MaestroError, Result};

/// Type alias for the boxed executor function.
type ToolExecutorFn = dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>
    + Send
    + Sync;

/// An invocable tool: static metadata plus an executor closure.
///
/// Tools with `requires_approval` set must never be executed without an
/// external affirmative signal; the orchestration core only carries the
/// flag through to persistence.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
    pub requires_approval: bool,
    executor: Arc<ToolExecutorFn>,
}

impl ToolDescriptor {
    /// Create a descriptor from a closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
        executor: F,
    ) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            requires_approval: false,
            executor: Arc::new(move |args| Box::pin(executor(args))),
        }
    }

    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// Run the raw executor. Callers inside the orchestration loop go
    /// through [`ToolExecutionGovernor`] instead.
    pub async fn invoke(&self, args: serde_json::Value) -> Result<serde_json::Value> {
        (self.executor)(args).await
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("requires_approval", &self.requires_approval)
            .finish()
    }
}

/// Name-keyed table of tool descriptors.
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<ToolDescriptor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ToolDescriptor>) -> Self {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor);
        }
        registry
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) {
        self.tools
            .insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        self.tools.get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<ToolDescriptor>> {
        self.get(name)
            .ok_or_else(|| MaestroError::InvalidArgument(format!("unknown tool '{name}'")))
    }

    /// Whether the named tool requires approval; unknown tools do not.
    pub fn requires_approval(&self, name: &str) -> bool {
        self.get(name).map(|t| t.requires_approval).unwrap_or(false)
    }

    /// Gateway-facing definitions, in arbitrary order.
    pub fn definitions(&self) -> Vec<crate::gateway::ToolDefinition> {
        self.tools
            .values()
            .map(|t| crate::gateway::ToolDefinition {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.schema.clone(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn descriptor_executes_closure() {
        let tool = ToolDescriptor::new(
            "echo",
            "Echo the arguments",
            serde_json::json!({"type": "object"}),
            |args| async move { Ok(args) },
        );
        let out = tool.invoke(serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(out["x"], 1);
    }

    #[test]
    fn registry_lookup_and_approval_flag() {
        let registry = ToolRegistry::from_descriptors([
            ToolDescriptor::new("safe", "", serde_json::json!({}), |_| async { Ok(serde_json::Value::Null) }),
            ToolDescriptor::new("dangerous", "", serde_json::json!({}), |_| async { Ok(serde_json::Value::Null) })
                .with_approval(),
        ]);
        assert!(registry.get("safe").is_some());
        assert!(registry.require("missing").is_err());
        assert!(!registry.requires_approval("safe"));
        assert!(registry.requires_approval("dangerous"));
        assert!(!registry.requires_approval("missing"));
    }
}
