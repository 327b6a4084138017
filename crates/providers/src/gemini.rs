//! Google Gemini provider (`generateContent` REST API).
//!
//! Tool calls travel as `functionCall` parts on `model` contents and their
//! results as `functionResponse` parts on `user` contents. The system
//! instruction goes in `systemInstruction`, outside the contents.

use async_trait::async_trait;
use chatdesk_core::error::ProviderError;
use chatdesk_core::provider::{ModelRequest, ModelResponse, RequestedCall};
use chatdesk_core::tool::ToolDeclaration;
use chatdesk_core::turn::{Arguments, Turn};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: Option<u32>,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
            max_output_tokens: None,
            client: crate::http_client(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_output_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    fn build_body(&self, request: &ModelRequest) -> GenerateRequest {
        GenerateRequest {
            system_instruction: (!request.system.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part::text(&request.system)],
            }),
            contents: Self::to_contents(&request.turns),
            tools: if request.tools.is_empty() {
                Vec::new()
            } else {
                vec![ApiTool {
                    function_declarations: Self::to_declarations(&request.tools),
                }]
            },
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }

    fn to_contents(turns: &[Turn]) -> Vec<Content> {
        turns
            .iter()
            .map(|turn| match turn {
                Turn::UserText { text } => Content::new("user", Part::text(text)),
                Turn::ModelText { text } => Content::new("model", Part::text(text)),
                Turn::ModelToolCall {
                    call_id,
                    tool_name,
                    arguments,
                } => Content::new(
                    "model",
                    Part {
                        function_call: Some(FunctionCall {
                            id: Some(call_id.clone()),
                            name: tool_name.clone(),
                            args: arguments.clone(),
                        }),
                        ..Part::default()
                    },
                ),
                Turn::ToolResult {
                    call_id,
                    tool_name,
                    outcome,
                } => Content::new(
                    "user",
                    Part {
                        function_response: Some(FunctionResponse {
                            id: Some(call_id.clone()),
                            name: tool_name.clone(),
                            response: outcome.to_model_payload(),
                        }),
                        ..Part::default()
                    },
                ),
            })
            .collect()
    }

    fn to_declarations(tools: &[ToolDeclaration]) -> Vec<FunctionDeclaration> {
        tools
            .iter()
            .map(|t| FunctionDeclaration {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            })
            .collect()
    }

    fn from_api_response(resp: GenerateResponse) -> Result<ModelResponse, ProviderError> {
        let candidate = resp.candidates.into_iter().next().ok_or_else(|| {
            let reason = resp
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".into());
            ProviderError::InvalidResponse(format!("Gemini returned no candidate: {reason}"))
        })?;

        let mut text = String::new();
        let mut calls = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(fc) = part.function_call {
                let call_id = fc
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                calls.push(RequestedCall::new(call_id, fc.name, fc.args));
            } else if let Some(t) = part.text {
                text.push_str(&t);
            }
        }

        if calls.is_empty() {
            Ok(ModelResponse::text(text))
        } else {
            Ok(ModelResponse::ToolCalls {
                calls,
                preamble: (!text.trim().is_empty()).then_some(text),
            })
        }
    }
}

#[async_trait]
impl chatdesk_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<ModelResponse, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = self.build_body(&request);

        debug!(
            model = %self.model,
            turns = request.turns.len(),
            tools = request.tools.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(crate::transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = crate::retry_after_secs(response.headers());
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini returned error");
            return Err(crate::status_error(status, retry_after, error_body));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {e}"))
        })?;

        Self::from_api_response(parsed)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models/{}", self.base_url, self.model);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(crate::transport_error)?;
        Ok(response.status().is_success())
    }
}

// --- Gemini API types (internal) ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn new(role: &str, part: Part) -> Self {
        Self {
            role: Some(role.into()),
            parts: vec![part],
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Arguments,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}
