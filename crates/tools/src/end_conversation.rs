//! end_conversation: closes the conversation once everything is captured.

use async_trait::async_trait;
use chatdesk_core::error::ToolError;
use chatdesk_core::tool::{Tool, ToolContext};
use chatdesk_core::turn::{Arguments, ToolOutcome};
use tracing::info;

pub struct EndConversationTool;

#[async_trait]
impl Tool for EndConversationTool {
    fn name(&self) -> &str {
        "end_conversation"
    }

    fn description(&self) -> &str {
        "Mark the conversation as completed. Use this once the company, contact details, \
         and inquiry are all captured and the client has been told an advisor will follow up."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "Optional brief summary of the conversation and its key points."
                }
            },
            "required": []
        })
    }

    async fn execute(
        &self,
        ctx: &mut ToolContext<'_>,
        arguments: &Arguments,
    ) -> Result<ToolOutcome, ToolError> {
        let summary = crate::optional_str(arguments, "summary")?;
        if summary.is_some() {
            ctx.facts.summary = summary.clone();
        }
        ctx.facts.closed = true;
        info!(session_id = %ctx.session_id, "Conversation marked as completed");

        Ok(ToolOutcome::success(serde_json::json!({
            "status": "completed",
            "summary": summary,
        })))
    }
}
