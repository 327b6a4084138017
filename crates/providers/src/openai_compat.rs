//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Groq, and any endpoint
//! exposing `/chat/completions` with function calling.

use async_trait::async_trait;
use chatdesk_core::error::ProviderError;
use chatdesk_core::provider::{ModelRequest, ModelResponse, RequestedCall};
use chatdesk_core::tool::ToolDeclaration;
use chatdesk_core::turn::{Arguments, Turn};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible language model provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: None,
            client: crate::http_client(),
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Convert the system instruction and turns to OpenAI API messages.
    fn to_api_messages(system: &str, turns: &[Turn]) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        if !system.is_empty() {
            messages.push(ApiMessage::text("system", system));
        }
        for turn in turns {
            let message = match turn {
                Turn::UserText { text } => ApiMessage::text("user", text),
                Turn::ModelText { text } => ApiMessage::text("assistant", text),
                Turn::ModelToolCall {
                    call_id,
                    tool_name,
                    arguments,
                } => ApiMessage {
                    role: "assistant".into(),
                    content: None,
                    tool_calls: Some(vec![ApiToolCall {
                        id: call_id.clone(),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: tool_name.clone(),
                            arguments: serde_json::Value::Object(arguments.clone()).to_string(),
                        },
                    }]),
                    tool_call_id: None,
                },
                Turn::ToolResult {
                    call_id, outcome, ..
                } => ApiMessage {
                    role: "tool".into(),
                    content: Some(outcome.to_model_payload().to_string()),
                    tool_calls: None,
                    tool_call_id: Some(call_id.clone()),
                },
            };
            messages.push(message);
        }
        messages
    }

    /// Convert tool declarations to OpenAI API format.
    fn to_api_tools(tools: &[ToolDeclaration]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    /// Turn the first choice into a model response.
    fn from_api_response(api_response: ApiResponse) -> Result<ModelResponse, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        let tool_calls = choice.message.tool_calls.unwrap_or_default();
        if tool_calls.is_empty() {
            return Ok(ModelResponse::text(
                choice.message.content.unwrap_or_default(),
            ));
        }

        // A bad argument string fails only its own call, not the batch
        let calls = tool_calls
            .into_iter()
            .map(|tc| match parse_arguments(&tc.function.arguments) {
                Ok(arguments) => RequestedCall::new(tc.id, tc.function.name, arguments),
                Err(error) => {
                    warn!(tool = %tc.function.name, call_id = %tc.id, error = %error, "Malformed tool arguments");
                    RequestedCall::malformed(tc.id, tc.function.name, tc.function.arguments, error)
                }
            })
            .collect();

        Ok(ModelResponse::ToolCalls {
            calls,
            preamble: choice.message.content.filter(|c| !c.trim().is_empty()),
        })
    }
}

/// Function arguments arrive as a JSON-encoded string.
fn parse_arguments(raw: &str) -> Result<Arguments, String> {
    if raw.trim().is_empty() {
        return Ok(Arguments::new());
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("tool arguments must be an object, got {other}")),
        Err(e) => Err(format!("tool arguments are not valid JSON: {e}")),
    }
}

#[async_trait]
impl chatdesk_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<ModelResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request.system, &request.turns),
            "temperature": self.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(
            provider = %self.name,
            model = %self.model,
            turns = request.turns.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(crate::transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = crate::retry_after_secs(response.headers());
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(crate::status_error(status, retry_after, error_body));
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {e}"))
        })?;

        Self::from_api_response(api_response)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(crate::transport_error)?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatdesk_core::Provider;
    use chatdesk_core::turn::ToolOutcome;

    #[test]
    fn constructors() {
        let provider = OpenAiCompatProvider::openai("sk-test").with_model("gpt-4o");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), "gpt-4o");
        assert!(provider.base_url.contains("api.openai.com"));

        let local = OpenAiCompatProvider::ollama(None);
        assert!(local.base_url.contains("localhost:11434"));
    }

    #[test]
    fn turn_conversion() {
        let mut args = Arguments::new();
        args.insert("company".into(), serde_json::json!("kossodo"));
        let turns = vec![
            Turn::user("I need a balance quote"),
            Turn::tool_call("call_1", "set_company", args),
            Turn::tool_result(
                "call_1",
                "set_company",
                ToolOutcome::success(serde_json::json!({"company": "kossodo"})),
            ),
            Turn::model_text("What's your name?"),
        ];
        let msgs = OpenAiCompatProvider::to_api_messages("be helpful", &turns);
        assert_eq!(msgs.len(), 5);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[1].role, "user");
        let tc = msgs[2].tool_calls.as_ref().unwrap();
        assert_eq!(tc[0].id, "call_1");
        assert!(tc[0].function.arguments.contains("kossodo"));
        assert_eq!(msgs[3].role, "tool");
        assert_eq!(msgs[3].tool_call_id.as_deref(), Some("call_1"));
        assert!(msgs[3].content.as_ref().unwrap().contains("\"success\":true"));
        assert_eq!(msgs[4].role, "assistant");
    }

    #[test]
    fn empty_system_is_omitted() {
        let msgs = OpenAiCompatProvider::to_api_messages("", &[Turn::user("hi")]);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].role, "user");
    }

    #[test]
    fn tool_declaration_conversion() {
        let tools = vec![ToolDeclaration {
            name: "save_inquiry".into(),
            description: "Capture the inquiry".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api_tools = OpenAiCompatProvider::to_api_tools(&tools);
        assert_eq!(api_tools[0].function.name, "save_inquiry");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn parse_text_response() {
        let data = r#"{"choices":[{"message":{"role":"assistant","content":"Hello!"}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let resp = OpenAiCompatProvider::from_api_response(parsed).unwrap();
        assert_eq!(resp, ModelResponse::text("Hello!"));
    }

    #[test]
    fn parse_tool_call_response_preserves_order() {
        let data = r#"{"choices":[{"message":{"role":"assistant","content":null,"tool_calls":[
            {"id":"a","type":"function","function":{"name":"save_contact","arguments":"{\"name\":\"Ana\"}"}},
            {"id":"b","type":"function","function":{"name":"save_inquiry","arguments":"{\"description\":\"quote\"}"}}
        ]}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let ModelResponse::ToolCalls { calls, preamble } =
            OpenAiCompatProvider::from_api_response(parsed).unwrap()
        else {
            panic!("expected tool calls");
        };
        assert!(preamble.is_none());
        assert_eq!(calls[0].name, "save_contact");
        assert_eq!(calls[0].arguments["name"], "Ana");
        assert_eq!(calls[1].call_id, "b");
    }

    #[test]
    fn argument_parsing() {
        assert!(parse_arguments("").unwrap().is_empty());
        assert!(parse_arguments("{not json").unwrap_err().contains("not valid JSON"));
        assert!(parse_arguments("[1,2]").unwrap_err().contains("must be an object"));
    }

    #[test]
    fn malformed_arguments_fail_only_their_call() {
        let data = r#"{"choices":[{"message":{"role":"assistant","content":null,"tool_calls":[
            {"id":"a","type":"function","function":{"name":"save_contact","arguments":"{\"name\": \"Ana\""}},
            {"id":"b","type":"function","function":{"name":"save_inquiry","arguments":"{\"description\":\"quote\"}"}}
        ]}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let ModelResponse::ToolCalls { calls, .. } =
            OpenAiCompatProvider::from_api_response(parsed).unwrap()
        else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 2);

        let bad = calls[0].malformed.as_ref().unwrap();
        assert_eq!(bad.raw, r#"{"name": "Ana""#);
        assert!(bad.error.contains("not valid JSON"));
        assert!(calls[0].arguments.is_empty());

        assert!(calls[1].malformed.is_none());
        assert_eq!(calls[1].arguments["description"], "quote");
    }

    #[test]
    fn no_choices_is_invalid_response() {
        let parsed: ApiResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            OpenAiCompatProvider::from_api_response(parsed),
            Err(ProviderError::InvalidResponse(_))
        ));
    }
}
