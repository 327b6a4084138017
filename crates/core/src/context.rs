//! The conversation context: an append-only turn log.
//!
//! The context is the literal input to every model invocation. It only
//! grows: there is no API to remove, replace, or reorder a turn, and
//! `append` refuses any turn that would break call/result pairing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::turn::Turn;

/// Pairing violations rejected by [`ConversationContext::append`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("tool call {call_id} has no result yet; cannot append {attempted}")]
    UnpairedToolCall {
        call_id: String,
        attempted: &'static str,
    },

    #[error("tool result {call_id} does not answer a pending tool call")]
    UnexpectedToolResult { call_id: String },
}

/// Ordered, append-only log of turns owned by one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationContext {
    turns: Vec<Turn>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn at the end of the log.
    ///
    /// A `ModelToolCall` must be answered by a `ToolResult` with the same
    /// call id before any other turn is accepted.
    pub fn append(&mut self, turn: Turn) -> Result<(), ContextError> {
        match (self.pending_call_id(), &turn) {
            (Some(pending), Turn::ToolResult { call_id, .. }) if pending != call_id => {
                return Err(ContextError::UnexpectedToolResult {
                    call_id: call_id.clone(),
                });
            }
            (Some(_), Turn::ToolResult { .. }) => {}
            (Some(pending), other) => {
                return Err(ContextError::UnpairedToolCall {
                    call_id: pending.to_string(),
                    attempted: other.kind(),
                });
            }
            (None, Turn::ToolResult { call_id, .. }) => {
                return Err(ContextError::UnexpectedToolResult {
                    call_id: call_id.clone(),
                });
            }
            (None, _) => {}
        }
        self.turns.push(turn);
        Ok(())
    }

    /// The full ordered sequence, used verbatim as model input.
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// The call id of a tool call still waiting for its result, if any.
    pub fn pending_call_id(&self) -> Option<&str> {
        match self.turns.last() {
            Some(Turn::ModelToolCall { call_id, .. }) => Some(call_id),
            _ => None,
        }
    }

    /// Number of user messages seen so far.
    pub fn user_turns(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| matches!(t, Turn::UserText { .. }))
            .count()
    }
}
