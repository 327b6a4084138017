//! Language model provider implementations for chatdesk.
//!
//! All providers implement the `chatdesk_core::Provider` trait.
//! `build_from_config` selects and wraps the configured backend.

pub mod gemini;
pub mod openai_compat;
pub mod retry;
pub mod router;

pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use retry::{RetryPolicy, RetryProvider};
pub use router::build_from_config;

use chatdesk_core::error::ProviderError;

const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Shared HTTP client with a request-level ceiling.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Map a transport failure onto the provider taxonomy.
pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Map a non-success HTTP status onto the provider taxonomy.
pub(crate) fn status_error(status: u16, retry_after: Option<u64>, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        404 => ProviderError::ModelNotFound(body),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

/// Seconds from a `Retry-After` header, when present and numeric.
pub(crate) fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_error(429, Some(2), String::new()),
            ProviderError::RateLimited { retry_after_secs: 2 }
        ));
        assert!(matches!(
            status_error(429, None, String::new()),
            ProviderError::RateLimited { retry_after_secs: 5 }
        ));
        assert!(matches!(
            status_error(401, None, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error(404, None, "no such model".into()),
            ProviderError::ModelNotFound(_)
        ));
        assert!(status_error(503, None, "overloaded".into()).is_transient());
        assert!(!status_error(400, None, "bad".into()).is_transient());
    }

    #[test]
    fn retry_after_header_parsing() {
        let mut headers = reqwest::header::HeaderMap::new();
        assert_eq!(retry_after_secs(&headers), None);
        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after_secs(&headers), Some(7));
    }
}
