//! save_contact: records or updates the client's contact details.
//!
//! Fields are merged: only the ones provided in a call are written, so the
//! model may collect them across several turns.

use async_trait::async_trait;
use chatdesk_core::error::ToolError;
use chatdesk_core::session::ContactField;
use chatdesk_core::tool::{Tool, ToolContext};
use chatdesk_core::turn::{Arguments, ToolOutcome};
use tracing::debug;

pub struct SaveContactTool;

#[async_trait]
impl Tool for SaveContactTool {
    fn name(&self) -> &str {
        "save_contact"
    }

    fn description(&self) -> &str {
        "Save or update the client's contact information. Use this whenever the client \
         provides their name, phone, email, company name, or tax ID. It can be called \
         several times as more details arrive; the result lists which fields are still missing."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "The client's full name" },
                "phone": { "type": "string", "description": "The client's phone number" },
                "email": { "type": "string", "description": "The client's email address" },
                "company_name": {
                    "type": "string",
                    "description": "The name of the client's company or organization"
                },
                "tax_id": {
                    "type": "string",
                    "description": "Business tax ID (11 digits) or personal ID (8 digits)"
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
        let mut provided = Vec::new();
        for field in ContactField::ALL {
            if let Some(value) = crate::optional_str(arguments, field.as_str())? {
                provided.push((field, value));
            }
        }

        if provided.is_empty() {
            return Ok(ToolOutcome::failure(
                "At least one contact field must be provided.",
            ));
        }

        let saved: Vec<&str> = provided.iter().map(|(f, _)| f.as_str()).collect();
        debug!(session_id = %ctx.session_id, fields = ?saved, "Saving contact fields");

        for (field, value) in &provided {
            ctx.facts.contact.set(*field, value.clone());
        }

        let missing: Vec<&str> = ctx
            .facts
            .contact
            .missing()
            .iter()
            .map(|f| f.as_str())
            .collect();

        Ok(ToolOutcome::success(serde_json::json!({
            "contact": ctx.facts.contact,
            "saved_fields": saved,
            "missing_fields": missing,
            "complete": missing.is_empty(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::run;
    use chatdesk_core::session::BusinessFacts;

    #[tokio::test]
    async fn merges_fields_across_calls() {
        let mut facts = BusinessFacts::default();
        let first = run(
            &SaveContactTool,
            &mut facts,
            serde_json::json!({"name": "Ana Torres", "phone": "987654321"}),
        )
        .await
        .unwrap();
        let ToolOutcome::Success { payload } = first else {
            panic!("expected success");
        };
        assert_eq!(payload["complete"], false);
        assert_eq!(
            payload["missing_fields"],
            serde_json::json!(["email", "company_name", "tax_id"])
        );

        let second = run(
            &SaveContactTool,
            &mut facts,
            serde_json::json!({
                "email": "ana@example.com",
                "company_name": "Lab Andino",
                "tax_id": "20123456789",
                "name": ""
            }),
        )
        .await
        .unwrap();
        let ToolOutcome::Success { payload } = second else {
            panic!("expected success");
        };
        assert_eq!(payload["complete"], true);
        // A blank value never overwrites an existing one
        assert_eq!(facts.contact.name.as_deref(), Some("Ana Torres"));
        assert!(facts.contact.is_complete());
    }

    #[tokio::test]
    async fn empty_call_is_failure() {
        let mut facts = BusinessFacts::default();
        let outcome = run(&SaveContactTool, &mut facts, serde_json::json!({"email": "  "}))
            .await
            .unwrap();
        assert!(!outcome.is_success());
        assert_eq!(facts.contact, Default::default());
    }

    #[tokio::test]
    async fn wrong_type_is_invalid_arguments() {
        let mut facts = BusinessFacts::default();
        let err = run(&SaveContactTool, &mut facts, serde_json::json!({"phone": {"n": 1}}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
