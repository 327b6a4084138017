//! Stage tracker: which tools are valid when, and what their outcomes do to
//! the conversation stage.
//!
//! The gating here is mechanical (stage membership, contact field presence)
//! and holds even when the model ignores its instructions.

use chatdesk_core::error::PreconditionFailed;
use chatdesk_core::session::{BusinessFacts, Stage};
use chatdesk_core::turn::{Arguments, ToolOutcome};

pub const SET_COMPANY: &str = "set_company";
pub const SAVE_CONTACT: &str = "save_contact";
pub const SAVE_INQUIRY: &str = "save_inquiry";
pub const END_CONVERSATION: &str = "end_conversation";

/// Static transition table over [`Stage`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTracker;

impl StageTracker {
    pub fn new() -> Self {
        Self
    }

    /// Tool names the model may call during `stage`.
    pub fn permitted_tools(&self, stage: Stage) -> &'static [&'static str] {
        match stage {
            Stage::Routing => &[SET_COMPANY],
            Stage::Collecting => &[SAVE_CONTACT],
            Stage::Resolving => &[SAVE_CONTACT, SAVE_INQUIRY],
            Stage::Closing => &[SAVE_INQUIRY, END_CONVERSATION],
            Stage::Ended => &[],
        }
    }

    pub fn is_permitted(&self, stage: Stage, tool_name: &str) -> bool {
        self.permitted_tools(stage).contains(&tool_name)
    }

    /// Check a call before its handler runs.
    ///
    /// The inquiry precondition is checked first so the model is told what
    /// is missing rather than that the tool is unavailable.
    pub fn validate(
        &self,
        stage: Stage,
        facts: &BusinessFacts,
        tool_name: &str,
        _arguments: &Arguments,
    ) -> Result<(), PreconditionFailed> {
        if tool_name == SAVE_INQUIRY {
            let missing = facts.contact.missing();
            if !missing.is_empty() {
                let names: Vec<&str> = missing.iter().map(|f| f.as_str()).collect();
                return Err(PreconditionFailed::new(format!(
                    "contact incomplete: missing {}",
                    names.join(", ")
                )));
            }
        }

        if !self.is_permitted(stage, tool_name) {
            return Err(PreconditionFailed::new(format!(
                "tool '{tool_name}' is not available during stage {stage}"
            )));
        }

        Ok(())
    }

    /// Stage after `tool_name` finished with `outcome`.
    ///
    /// `facts` is the state after the handler ran. Failures never advance,
    /// and no transition goes backwards.
    pub fn advance(
        &self,
        stage: Stage,
        tool_name: &str,
        outcome: &ToolOutcome,
        facts: &BusinessFacts,
    ) -> Stage {
        if !outcome.is_success() {
            return stage;
        }

        let next = match (stage, tool_name) {
            (Stage::Routing, SET_COMPANY) => Stage::Collecting,
            (Stage::Collecting, SAVE_CONTACT) if facts.contact.is_complete() => Stage::Resolving,
            (Stage::Resolving, SAVE_INQUIRY) => Stage::Closing,
            (Stage::Closing, END_CONVERSATION) => Stage::Ended,
            _ => stage,
        };

        next.max(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatdesk_core::session::ContactField;

    const ALL_STAGES: [Stage; 5] = [
        Stage::Routing,
        Stage::Collecting,
        Stage::Resolving,
        Stage::Closing,
        Stage::Ended,
    ];

    const ALL_TOOLS: [&str; 4] = [SET_COMPANY, SAVE_CONTACT, SAVE_INQUIRY, END_CONVERSATION];

    fn complete_facts() -> BusinessFacts {
        let mut facts = BusinessFacts {
            company: Some("kossodo".into()),
            ..BusinessFacts::default()
        };
        for field in ContactField::ALL {
            facts.contact.set(field, "x");
        }
        facts
    }

    fn ok() -> ToolOutcome {
        ToolOutcome::success(serde_json::json!({}))
    }

    #[test]
    fn permitted_sets() {
        let t = StageTracker::new();
        assert_eq!(t.permitted_tools(Stage::Routing), [SET_COMPANY]);
        assert_eq!(t.permitted_tools(Stage::Collecting), [SAVE_CONTACT]);
        assert!(t.is_permitted(Stage::Resolving, SAVE_INQUIRY));
        assert!(t.is_permitted(Stage::Closing, END_CONVERSATION));
        assert!(t.permitted_tools(Stage::Ended).is_empty());
    }

    #[test]
    fn out_of_stage_call_is_rejected() {
        let t = StageTracker::new();
        let err = t
            .validate(Stage::Routing, &BusinessFacts::default(), END_CONVERSATION, &Arguments::new())
            .unwrap_err();
        assert_eq!(
            err.reason,
            "tool 'end_conversation' is not available during stage ROUTING"
        );
        assert!(t
            .validate(Stage::Ended, &complete_facts(), SET_COMPANY, &Arguments::new())
            .is_err());
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let t = StageTracker::new();
        assert!(t
            .validate(Stage::Resolving, &complete_facts(), "delete_everything", &Arguments::new())
            .is_err());
    }

    #[test]
    fn inquiry_gated_on_every_missing_field_permutation() {
        let t = StageTracker::new();
        // Every non-empty subset of the five contact fields left missing
        for mask in 1u32..(1 << ContactField::ALL.len()) {
            let mut facts = BusinessFacts::default();
            for (i, field) in ContactField::ALL.into_iter().enumerate() {
                if mask & (1 << i) == 0 {
                    facts.contact.set(field, "value");
                }
            }

            for stage in [Stage::Collecting, Stage::Resolving, Stage::Closing] {
                let err = t
                    .validate(stage, &facts, SAVE_INQUIRY, &Arguments::new())
                    .unwrap_err();
                let listed: Vec<&str> = err
                    .reason
                    .strip_prefix("contact incomplete: missing ")
                    .unwrap_or_else(|| panic!("mask {mask:05b}: {}", err.reason))
                    .split(", ")
                    .collect();
                let expected: Vec<&str> = ContactField::ALL
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, field)| field.as_str())
                    .collect();
                assert_eq!(listed, expected, "mask {mask:05b}");

                // A rejected call never reaches advance with a success
                let rejected = ToolOutcome::failure(err.reason);
                assert_eq!(t.advance(stage, SAVE_INQUIRY, &rejected, &facts), stage);
            }
        }
    }

    #[test]
    fn inquiry_allowed_once_contact_complete() {
        let t = StageTracker::new();
        assert!(t
            .validate(Stage::Resolving, &complete_facts(), SAVE_INQUIRY, &Arguments::new())
            .is_ok());
    }

    #[test]
    fn blank_contact_field_counts_as_missing() {
        let t = StageTracker::new();
        let mut facts = complete_facts();
        facts.contact.set(ContactField::TaxId, "  ");
        let err = t
            .validate(Stage::Resolving, &facts, SAVE_INQUIRY, &Arguments::new())
            .unwrap_err();
        assert_eq!(err.reason, "contact incomplete: missing tax_id");
    }

    #[test]
    fn happy_path_transitions() {
        let t = StageTracker::new();
        let facts = complete_facts();
        let mut stage = Stage::Routing;
        for tool in [SET_COMPANY, SAVE_CONTACT, SAVE_INQUIRY, END_CONVERSATION] {
            stage = t.advance(stage, tool, &ok(), &facts);
        }
        assert_eq!(stage, Stage::Ended);
    }

    #[test]
    fn partial_contact_stays_collecting() {
        let t = StageTracker::new();
        let mut facts = BusinessFacts::default();
        facts.contact.set(ContactField::Name, "Ana");
        assert_eq!(
            t.advance(Stage::Collecting, SAVE_CONTACT, &ok(), &facts),
            Stage::Collecting
        );
    }

    #[test]
    fn failures_never_advance() {
        let t = StageTracker::new();
        let facts = complete_facts();
        for stage in ALL_STAGES {
            for tool in ALL_TOOLS {
                let next = t.advance(stage, tool, &ToolOutcome::failure("nope"), &facts);
                assert_eq!(next, stage);
            }
        }
    }

    #[test]
    fn never_regresses() {
        let t = StageTracker::new();
        for facts in [BusinessFacts::default(), complete_facts()] {
            for stage in ALL_STAGES {
                for tool in ALL_TOOLS.into_iter().chain(["unknown"]) {
                    assert!(t.advance(stage, tool, &ok(), &facts) >= stage);
                }
            }
        }
        // Updating contact after it was complete keeps RESOLVING
        assert_eq!(
            t.advance(Stage::Resolving, SAVE_CONTACT, &ok(), &complete_facts()),
            Stage::Resolving
        );
    }
}
