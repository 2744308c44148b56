use futures::StreamExt;
use log::warn;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use async_trait::async_trait;

use super::{ChatClient, ChunkStream, CompletionResponse};
use crate::llm::{LlmConfig, LlmError};
use crate::models::chat::ChatMessage;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const TEMPERATURE: f32 = 0.1;

pub struct OpenAiChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiStreamResponse {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let endpoint = resolve_endpoint(&base_url);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?,
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key,
            model,
            endpoint,
        })
    }

    pub fn from_config(
        config: &LlmConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Self::new(
            config.api_key.clone().unwrap_or_default(),
            config.completion_model.clone(),
            config.base_url.clone(),
            config.timeout_secs,
        )
    }

    fn request_body(&self, messages: &[ChatMessage], stream: bool) -> OpenAiChatRequest {
        OpenAiChatRequest {
            model: self.model.clone(),
            messages: messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: TEMPERATURE,
            stream: stream.then_some(true),
        }
    }
}

/// The configured base URL may already point at the completion route; only
/// append the path when it does not.
fn resolve_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else {
        format!("{}/chat/completions", trimmed)
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<CompletionResponse, LlmError> {
        let req = self.request_body(messages, false);

        let resp = self.http.post(&self.endpoint).json(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status, &body));
        }

        let parsed: OpenAiResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::MalformedResponse("response contained no choices".into()))?;

        Ok(CompletionResponse { response: content })
    }

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream, LlmError> {
        let req = self.request_body(messages, true);
        let (tx, rx) = mpsc::channel::<Result<String, LlmError>>(32);
        let client = self.http.clone();
        let url = self.endpoint.clone();
        let auth_header = format!("Bearer {}", self.api_key);

        tokio::spawn(async move {
            let resp = match client
                .post(&url)
                .header(AUTHORIZATION, auth_header)
                .json(&req)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(Err(LlmError::Network(e))).await;
                    return;
                }
            };

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                let _ = tx.send(Err(LlmError::from_status(status, &body))).await;
                return;
            }

            let mut bytes = resp.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(buf) => buf,
                    Err(e) => {
                        let _ = tx.send(Err(LlmError::Network(e))).await;
                        return;
                    }
                };

                // SSE lines can split across network chunks; keep the
                // trailing partial line in the buffer.
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim_end_matches('\r').to_string();
                    buffer.drain(..newline + 1);

                    if line.is_empty() || line == "data: [DONE]" {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };

                    match serde_json::from_str::<OpenAiStreamResponse>(data) {
                        Ok(stream_resp) => {
                            for choice in stream_resp.choices {
                                if let Some(content) = choice.delta.content {
                                    if !content.is_empty()
                                        && tx.send(Ok(content)).await.is_err()
                                    {
                                        // Receiver dropped; abort the upstream read.
                                        return;
                                    }
                                }

                                if choice.finish_reason.as_deref() == Some("stop") {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            warn!("Skipping unparseable stream line: {} ({})", data, e);
                        }
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_completion_route() {
        assert_eq!(
            resolve_endpoint("https://api.openai.com/v1"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            resolve_endpoint("http://localhost:8080/v1/"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn endpoint_keeps_explicit_completion_route() {
        assert_eq!(
            resolve_endpoint("http://localhost:8080/v1/chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn stream_payload_parses_delta_content() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        let parsed: OpenAiStreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("Hel"));
        assert!(parsed.choices[0].finish_reason.is_none());
    }
}
