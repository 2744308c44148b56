pub mod chat;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            completion_model: None,
            base_url: None,
            timeout_secs: 120,
        }
    }
}

/// Failure kinds at the model invoker boundary. Callers can tell an auth
/// problem from a rate limit or a transport failure instead of getting one
/// undifferentiated error.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("upstream rejected credentials")]
    Auth,

    #[error("upstream rate limit exceeded")]
    RateLimited,

    #[error("upstream returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("upstream request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 | 403 => LlmError::Auth,
            429 => LlmError::RateLimited,
            code => LlmError::Api {
                status: code,
                message: body.trim().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(matches!(
            LlmError::from_status(StatusCode::UNAUTHORIZED, ""),
            LlmError::Auth
        ));
        assert!(matches!(
            LlmError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            LlmError::RateLimited
        ));
        assert!(matches!(
            LlmError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            LlmError::Api { status: 500, .. }
        ));
    }
}
