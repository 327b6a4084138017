//! Provider selection from configuration.

use std::sync::Arc;

use chatdesk_config::{AppConfig, ConfigError};
use chatdesk_core::provider::Provider;

use crate::gemini::GeminiProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::{RetryPolicy, RetryProvider};

/// Build the configured provider, wrapped in the retry policy.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ConfigError> {
    let name = config.provider.as_str();
    let section = config.providers.get(name);

    let model = section
        .and_then(|p| p.model.clone())
        .unwrap_or_else(|| config.model.clone());
    let api_url = section.and_then(|p| p.api_url.clone());
    let api_key = match config.resolved_api_key() {
        Some(key) => key.to_string(),
        None if is_keyless(name) => String::new(),
        None => {
            return Err(ConfigError::ValidationError(format!(
                "no API key configured for provider '{name}' (set CHATDESK_API_KEY)"
            )));
        }
    };

    let max_tokens = Some(config.max_tokens);
    let base: Arc<dyn Provider> = if name == "gemini" {
        let mut p = GeminiProvider::new(api_key, model)
            .with_generation(config.temperature, max_tokens);
        if let Some(url) = api_url {
            p = p.with_base_url(url);
        }
        Arc::new(p)
    } else {
        let base_url = api_url.unwrap_or_else(|| default_base_url(name));
        Arc::new(
            OpenAiCompatProvider::new(name, base_url, api_key)
                .with_model(model)
                .with_generation(config.temperature, max_tokens),
        )
    };

    let retry = &config.agent.retry;
    Ok(Arc::new(RetryProvider::new(
        base,
        RetryPolicy {
            max_retries: retry.max_retries,
            initial_backoff_ms: retry.initial_backoff_ms,
            max_backoff_ms: retry.max_backoff_ms,
        },
    )))
}

/// Local servers that accept requests without a key.
fn is_keyless(provider_name: &str) -> bool {
    matches!(provider_name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
