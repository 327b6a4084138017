//! Turn and tool-outcome value types.
//!
//! A turn is one entry in a conversation context. The four variants cover
//! everything that flows between the user, the model, and the tools.

use serde::{Deserialize, Serialize};

/// Tool-call arguments: parameter name to JSON value.
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// The result of running (or refusing to run) a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { payload: serde_json::Value },
    Failure { reason: String },
}

impl ToolOutcome {
    pub fn success(payload: serde_json::Value) -> Self {
        Self::Success { payload }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The shape handed back to the model as a function response.
    pub fn to_model_payload(&self) -> serde_json::Value {
        match self {
            Self::Success { payload } => serde_json::json!({
                "success": true,
                "payload": payload,
            }),
            Self::Failure { reason } => serde_json::json!({
                "success": false,
                "reason": reason,
            }),
        }
    }
}

/// One entry in the conversation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    /// Text typed by the end user.
    UserText { text: String },

    /// Text produced by the model. Terminates an orchestration run.
    ModelText { text: String },

    /// A tool invocation requested by the model.
    ModelToolCall {
        call_id: String,
        tool_name: String,
        arguments: Arguments,
    },

    /// The outcome of the tool call with the same `call_id`.
    ToolResult {
        call_id: String,
        tool_name: String,
        outcome: ToolOutcome,
    },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::UserText { text: text.into() }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self::ModelText { text: text.into() }
    }

    pub fn tool_call(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Arguments,
    ) -> Self {
        Self::ModelToolCall {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        outcome: ToolOutcome,
    ) -> Self {
        Self::ToolResult {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            outcome,
        }
    }

    /// The call id for tool-call and tool-result turns.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Self::ModelToolCall { call_id, .. } | Self::ToolResult { call_id, .. } => {
                Some(call_id)
            }
            _ => None,
        }
    }

    /// Short label used in logs and debug views.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserText { .. } => "user_text",
            Self::ModelText { .. } => "model_text",
            Self::ModelToolCall { .. } => "model_tool_call",
            Self::ToolResult { .. } => "tool_result",
        }
    }
}
