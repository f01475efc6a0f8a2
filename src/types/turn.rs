//! Conversation turns and tool invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a turn within a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    ToolResult,
}

/// Human-approval state of a tool invocation.
///
/// Seeded from the tool descriptor's `requires_approval` flag when the
/// invocation is persisted; the approval workflow itself lives outside the
/// orchestration core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    #[default]
    NotRequired,
    Pending,
    Accepted,
    Rejected,
}

/// One tool call requested by the model within an assistant turn.
///
/// `arguments` may hold an opaque string instead of structured data when a
/// run was cancelled while the argument fragment was still streaming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub validation: ValidationState,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            result: None,
            validation: ValidationState::NotRequired,
        }
    }
}

/// Entity category of an assistant turn, derived from its invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantKind {
    Plain,
    WithTools,
}

/// One logical exchange unit. Immutable once persisted; the orchestrator
/// only ever appends new turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<ToolInvocation>,
    pub complete: bool,
    pub created_at: DateTime<Utc>,
    pub conversation_id: String,
}

impl Turn {
    /// Create a complete user turn.
    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            invocations: Vec::new(),
            complete: true,
            created_at: Utc::now(),
            conversation_id: conversation_id.into(),
        }
    }

    /// Create a complete assistant turn.
    pub fn assistant(
        conversation_id: impl Into<String>,
        content: impl Into<String>,
        invocations: Vec<ToolInvocation>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            invocations,
            complete: true,
            created_at: Utc::now(),
            conversation_id: conversation_id.into(),
        }
    }

    /// Create a tool-result turn linked to its originating invocation id.
    ///
    /// Tool results are atomic and never interruptible mid-result, so they
    /// are always complete.
    pub fn tool_result(
        conversation_id: impl Into<String>,
        invocation_id: impl Into<String>,
        name: impl Into<String>,
        result: serde_json::Value,
    ) -> Self {
        let mut invocation =
            ToolInvocation::new(invocation_id, name, serde_json::Value::Null);
        invocation.result = Some(result);
        Self {
            role: Role::ToolResult,
            content: String::new(),
            invocations: vec![invocation],
            complete: true,
            created_at: Utc::now(),
            conversation_id: conversation_id.into(),
        }
    }

    /// Entity category for assistant turns; `None` for other roles.
    pub fn assistant_kind(&self) -> Option<AssistantKind> {
        match self.role {
            Role::Assistant if self.invocations.is_empty() => Some(AssistantKind::Plain),
            Role::Assistant => Some(AssistantKind::WithTools),
            _ => None,
        }
    }

    /// The invocation id a tool-result turn answers, if any.
    pub fn answered_invocation(&self) -> Option<&str> {
        match self.role {
            Role::ToolResult => self.invocations.first().map(|i| i.id.as_str()),
            _ => None,
        }
    }
}
