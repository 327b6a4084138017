//! Provider trait: the abstraction over hosted language models.
//!
//! A Provider takes the conversation turns plus the tools currently on offer
//! and returns either a final text or an ordered batch of tool calls.
//!
//! Implementations: OpenAI-compatible endpoints, Gemini.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::tool::ToolDeclaration;
use crate::turn::{Arguments, Turn};

/// One model invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// System instruction sent alongside the turns, never part of them.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system: String,

    /// The full conversation context, verbatim.
    pub turns: Vec<Turn>,

    /// Declarations the model may call during this invocation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,
}

impl ModelRequest {
    pub fn new(turns: Vec<Turn>, tools: Vec<ToolDeclaration>) -> Self {
        Self {
            system: String::new(),
            turns,
            tools,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedCall {
    pub call_id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Arguments,
    /// Set when the model's arguments could not be decoded; `arguments`
    /// is then empty and the call is answered with a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malformed: Option<MalformedArguments>,
}

/// Argument text the model sent that is not a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MalformedArguments {
    pub raw: String,
    pub error: String,
}

impl RequestedCall {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
            malformed: None,
        }
    }

    /// A call whose argument text could not be decoded.
    pub fn malformed(
        call_id: impl Into<String>,
        name: impl Into<String>,
        raw: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments: Arguments::new(),
            malformed: Some(MalformedArguments {
                raw: raw.into(),
                error: error.into(),
            }),
        }
    }
}

/// What a model invocation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelResponse {
    /// Final answer for this orchestration run.
    Text { text: String },

    /// One or more tool calls, in the order the model emitted them.
    ToolCalls {
        calls: Vec<RequestedCall>,
        /// Text the model emitted next to its calls, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preamble: Option<String>,
    },
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_calls(calls: Vec<RequestedCall>) -> Self {
        Self::ToolCalls {
            calls,
            preamble: None,
        }
    }
}

/// The core Provider trait.
///
/// The orchestrator calls `generate()` without knowing which backend is in
/// use. Errors must be classifiable via [`ProviderError::is_transient`].
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "gemini").
    fn name(&self) -> &str;

    /// The model identifier requests are sent to.
    fn model(&self) -> &str {
        ""
    }

    /// Invoke the model once.
    async fn generate(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<ModelResponse, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
