//! Tool trait: the abstraction over side-effecting business operations.
//!
//! Tools are what let the model act on a conversation: select a business
//! unit, record contact details, capture an inquiry, close the session.
//! Each tool only touches the [`BusinessFacts`] it is handed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ToolError;
use crate::session::{BusinessFacts, SessionId};
use crate::turn::{Arguments, ToolOutcome};

/// A tool declaration sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,

    /// Natural-language description, consumed only by the model.
    pub description: String,

    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// Mutable view of the session a tool runs against.
pub struct ToolContext<'a> {
    pub session_id: &'a SessionId,
    pub facts: &'a mut BusinessFacts,
}

impl<'a> ToolContext<'a> {
    pub fn new(session_id: &'a SessionId, facts: &'a mut BusinessFacts) -> Self {
        Self { session_id, facts }
    }
}

/// The core Tool trait.
///
/// Expected business failures (missing fields, invalid values) are returned
/// as `Ok(ToolOutcome::Failure { .. })`. An `Err` is an unexpected fault and
/// is converted to a generic failure by the caller.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "set_company").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        ctx: &mut ToolContext<'_>,
        arguments: &Arguments,
    ) -> std::result::Result<ToolOutcome, ToolError>;

    /// Convert this tool into a declaration for the model.
    fn to_declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Lookup table from tool name to tool, built once at startup.
///
/// The orchestrator uses this to:
/// 1. Get the declarations permitted at the current stage
/// 2. Dispatch tool calls by name
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Fails if the name is already taken.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> std::result::Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateToolName(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All declarations, sorted by name.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        let mut decls: Vec<_> = self.tools.values().map(|t| t.to_declaration()).collect();
        decls.sort_by(|a, b| a.name.cmp(&b.name));
        decls
    }

    /// Declarations restricted to `permitted`, in the order given.
    /// Names that are not registered are skipped.
    pub fn declarations_for(&self, permitted: &[&str]) -> Vec<ToolDeclaration> {
        permitted
            .iter()
            .filter_map(|name| self.tools.get(*name))
            .map(|t| t.to_declaration())
            .collect()
    }

    /// Run the named tool.
    pub async fn dispatch(
        &self,
        name: &str,
        ctx: &mut ToolContext<'_>,
        arguments: &Arguments,
    ) -> std::result::Result<ToolOutcome, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(ctx, arguments).await
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records its argument as the inquiry.
    struct NoteTool;

    #[async_trait]
    impl Tool for NoteTool {
        fn name(&self) -> &str {
            "note"
        }
        fn description(&self) -> &str {
            "Stores a note"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            ctx: &mut ToolContext<'_>,
            arguments: &Arguments,
        ) -> std::result::Result<ToolOutcome, ToolError> {
            let text = arguments
                .get("text")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::InvalidArguments("text is required".into()))?;
            ctx.facts.inquiry = Some(text.to_string());
            Ok(ToolOutcome::success(serde_json::json!({ "text": text })))
        }
    }

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "named"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        async fn execute(
            &self,
            _ctx: &mut ToolContext<'_>,
            _arguments: &Arguments,
        ) -> std::result::Result<ToolOutcome, ToolError> {
            Ok(ToolOutcome::success(serde_json::json!({})))
        }
    }

    fn args(value: serde_json::Value) -> Arguments {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(NoteTool)).unwrap();
        let err = registry.register(Box::new(NoteTool)).unwrap_err();
        assert!(matches!(err, ToolError::DuplicateToolName(name) if name == "note"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn declarations_are_filtered_and_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Named("zeta"))).unwrap();
        registry.register(Box::new(Named("alpha"))).unwrap();
        registry.register(Box::new(NoteTool)).unwrap();

        let all: Vec<_> = registry.declarations().into_iter().map(|d| d.name).collect();
        assert_eq!(all, ["alpha", "note", "zeta"]);

        let some: Vec<_> = registry
            .declarations_for(&["zeta", "missing", "note"])
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(some, ["zeta", "note"]);
        assert!(registry.declarations_for(&[]).is_empty());
    }

    #[tokio::test]
    async fn dispatch_runs_handler_against_facts() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(NoteTool)).unwrap();

        let id = SessionId::from("s1");
        let mut facts = BusinessFacts::default();
        let mut ctx = ToolContext::new(&id, &mut facts);
        let outcome = registry
            .dispatch("note", &mut ctx, &args(serde_json::json!({"text": "quote"})))
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(facts.inquiry.as_deref(), Some("quote"));
    }

    #[tokio::test]
    async fn dispatch_unknown_tool() {
        let registry = ToolRegistry::new();
        let id = SessionId::from("s1");
        let mut facts = BusinessFacts::default();
        let mut ctx = ToolContext::new(&id, &mut facts);
        let err = registry
            .dispatch("nonexistent", &mut ctx, &Arguments::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }
}
