//! System instruction and canned replies.
//!
//! The instruction is rebuilt for every model invocation and travels next
//! to the context, never inside it.

use chatdesk_core::session::Session;
use std::fmt::Write;

use crate::stage_tracker::{END_CONVERSATION, SAVE_CONTACT, SAVE_INQUIRY, SET_COMPANY};

pub const DEFAULT_BASE_PROMPT: &str = "\
You are the sales assistant for a group of industrial supply companies. \
Work out which business unit the customer needs and select it, collect the \
customer's contact details (full name, phone, email, company name, tax id), \
record what they are asking for, then close the conversation politely. \
Ask only for what is still missing. Use the tools you are offered; tools \
that are not offered are not available yet. Keep replies short.";

/// Reply used when a closed conversation receives another message.
pub const CONVERSATION_CLOSED_REPLY: &str =
    "This conversation has been closed. Please start a new conversation if you need anything else.";

/// Base instruction followed by a status block describing where the
/// session stands.
pub fn system_instruction(base: &str, session: &Session, available_tools: &[&str]) -> String {
    let mut out = String::with_capacity(base.len() + 256);
    out.push_str(base.trim_end());
    out.push_str("\n\n## Conversation status\n");

    let _ = writeln!(out, "- Stage: {}", session.stage);
    let _ = writeln!(
        out,
        "- Business unit: {}",
        session.facts.company.as_deref().unwrap_or("not selected")
    );

    let missing = session.facts.contact.missing();
    if missing.is_empty() {
        out.push_str("- Contact details: complete\n");
    } else {
        let names: Vec<&str> = missing.iter().map(|f| f.as_str()).collect();
        let _ = writeln!(out, "- Missing contact fields: {}", names.join(", "));
    }

    if session.facts.inquiry.is_some() {
        out.push_str("- Inquiry: recorded\n");
    }

    if available_tools.is_empty() {
        out.push_str("- Available tools: none\n");
    } else {
        let _ = writeln!(out, "- Available tools: {}", available_tools.join(", "));
    }

    out
}

/// Reply for a run whose final model text came back empty.
pub fn fallback_reply(last_successful_tool: Option<&str>, company: Option<&str>) -> String {
    match last_successful_tool {
        Some(END_CONVERSATION) => {
            "Thank you for contacting us! An advisor will be in touch with you soon. Have a great day!"
                .into()
        }
        Some(SAVE_INQUIRY) => match company {
            Some(unit) => format!(
                "Perfect. A {} specialist will contact you shortly. Is there anything else I can help you with?",
                capitalize(unit)
            ),
            None => "Perfect. An advisor will contact you shortly. Is there anything else I can help you with?".into(),
        },
        Some(SAVE_CONTACT) => {
            "Thank you. Could you provide the details that are still missing?".into()
        }
        Some(SET_COMPANY) => {
            "Understood. So an advisor can reach you, I need a few details. What is your full name?"
                .into()
        }
        _ => "How can I help you?".into(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatdesk_core::session::{ContactField, SessionId, Stage};

    #[test]
    fn status_block_reflects_session() {
        let mut session = Session::new(SessionId::from("s1"));
        session.stage = Stage::Collecting;
        session.facts.company = Some("kossomet".into());
        session.facts.contact.set(ContactField::Name, "Ana");

        let text = system_instruction("Be helpful.", &session, &[SAVE_CONTACT]);
        assert!(text.starts_with("Be helpful."));
        assert!(text.contains("- Stage: COLLECTING"));
        assert!(text.contains("- Business unit: kossomet"));
        assert!(text.contains("- Missing contact fields: phone, email, company_name, tax_id"));
        assert!(text.contains("- Available tools: save_contact"));
    }

    #[test]
    fn status_block_for_fresh_session() {
        let session = Session::new(SessionId::from("s1"));
        let text = system_instruction(DEFAULT_BASE_PROMPT, &session, &[SET_COMPANY]);
        assert!(text.contains("- Business unit: not selected"));
        assert!(!text.contains("Inquiry"));
    }

    #[test]
    fn fallback_keyed_by_last_tool() {
        assert!(fallback_reply(Some(END_CONVERSATION), None).contains("Thank you for contacting"));
        assert!(fallback_reply(Some(SAVE_INQUIRY), Some("kossomet")).contains("A Kossomet specialist"));
        assert!(fallback_reply(Some(SET_COMPANY), None).contains("full name"));
        assert_eq!(fallback_reply(None, None), "How can I help you?");
    }
}
