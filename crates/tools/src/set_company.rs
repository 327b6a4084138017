//! set_company: routes the conversation to a business unit.

use async_trait::async_trait;
use chatdesk_core::error::ToolError;
use chatdesk_core::tool::{Tool, ToolContext};
use chatdesk_core::turn::{Arguments, ToolOutcome};
use tracing::debug;

pub struct SetCompanyTool {
    units: Vec<String>,
}

impl SetCompanyTool {
    pub fn new(units: Vec<String>) -> Self {
        Self {
            units: units
                .into_iter()
                .map(|u| u.trim().to_lowercase())
                .filter(|u| !u.is_empty())
                .collect(),
        }
    }
}

#[async_trait]
impl Tool for SetCompanyTool {
    fn name(&self) -> &str {
        "set_company"
    }

    fn description(&self) -> &str {
        "Set the business unit the client's inquiry is directed to. \
         Use this once the client indicates which company their inquiry is for."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "company": {
                    "type": "string",
                    "enum": self.units,
                    "description": format!("The business unit: one of {}", self.units.join(", "))
                }
            },
            "required": ["company"]
        })
    }

    async fn execute(
        &self,
        ctx: &mut ToolContext<'_>,
        arguments: &Arguments,
    ) -> Result<ToolOutcome, ToolError> {
        let Some(company) = crate::optional_str(arguments, "company")? else {
            return Ok(ToolOutcome::failure("A company must be provided."));
        };
        let company = company.to_lowercase();

        if !self.units.contains(&company) {
            return Ok(ToolOutcome::failure(format!(
                "Invalid company: {company}. Must be one of: {}.",
                self.units.join(", ")
            )));
        }

        debug!(session_id = %ctx.session_id, company = %company, "Business unit selected");
        ctx.facts.company = Some(company.clone());

        Ok(ToolOutcome::success(serde_json::json!({
            "company": company,
            "message": format!("Company set to {company}."),
        })))
    }
}
