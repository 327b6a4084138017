//! save_inquiry: captures what the client is asking for.

use async_trait::async_trait;
use chatdesk_core::error::ToolError;
use chatdesk_core::tool::{Tool, ToolContext};
use chatdesk_core::turn::{Arguments, ToolOutcome};

pub struct SaveInquiryTool;

#[async_trait]
impl Tool for SaveInquiryTool {
    fn name(&self) -> &str {
        "save_inquiry"
    }

    fn description(&self) -> &str {
        "Save the client's inquiry. Use this when the client describes the product or \
         service they are interested in or the information they need. Capture the full \
         context of the request, including quantities and specific requirements."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Detailed description of the inquiry: products or services, \
                                    quantities, and any specific requirements mentioned."
                }
            },
            "required": ["description"]
        })
    }

    async fn execute(
        &self,
        ctx: &mut ToolContext<'_>,
        arguments: &Arguments,
    ) -> Result<ToolOutcome, ToolError> {
        let Some(description) = crate::optional_str(arguments, "description")? else {
            return Ok(ToolOutcome::failure("Inquiry description cannot be empty."));
        };

        ctx.facts.inquiry = Some(description.clone());
        tracing::debug!(session_id = %ctx.session_id, chars = description.len(), "Inquiry saved");

        Ok(ToolOutcome::success(serde_json::json!({
            "description": description,
            "message": "Inquiry saved successfully.",
        })))
    }
}
