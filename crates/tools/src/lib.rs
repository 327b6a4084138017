//! Business tools for chatdesk.
//!
//! Each tool advances one step of a sales-inquiry conversation by writing
//! to the session's business facts:
//! route to a business unit, collect contact details, capture the inquiry,
//! and close the conversation.

pub mod end_conversation;
pub mod save_contact;
pub mod save_inquiry;
pub mod set_company;

use chatdesk_core::error::ToolError;
use chatdesk_core::tool::ToolRegistry;
use chatdesk_core::turn::Arguments;

pub use end_conversation::EndConversationTool;
pub use save_contact::SaveContactTool;
pub use save_inquiry::SaveInquiryTool;
pub use set_company::SetCompanyTool;

/// Create the registry with all four business tools.
///
/// `units` are the business units `set_company` accepts.
pub fn default_registry(units: &[String]) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(SetCompanyTool::new(units.to_vec())))?;
    registry.register(Box::new(SaveContactTool))?;
    registry.register(Box::new(SaveInquiryTool))?;
    registry.register(Box::new(EndConversationTool))?;
    Ok(registry)
}

/// Read an optional string argument, trimmed. Blank counts as absent.
pub(crate) fn optional_str(arguments: &Arguments, key: &str) -> Result<Option<String>, ToolError> {
    match arguments.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "'{key}' must be a string, got {other}"
        ))),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chatdesk_core::session::{BusinessFacts, SessionId};
    use chatdesk_core::tool::{Tool, ToolContext};
    use chatdesk_core::turn::{Arguments, ToolOutcome};

    pub fn args(value: serde_json::Value) -> Arguments {
        value.as_object().cloned().unwrap_or_default()
    }

    pub async fn run(
        tool: &dyn Tool,
        facts: &mut BusinessFacts,
        value: serde_json::Value,
    ) -> Result<ToolOutcome, chatdesk_core::ToolError> {
        let id = SessionId::from("test-session");
        let mut ctx = ToolContext::new(&id, facts);
        tool.execute(&mut ctx, &args(value)).await
    }
}
