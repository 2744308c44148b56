pub mod openai;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

use super::{LlmConfig, LlmError};
use crate::models::chat::ChatMessage;
use self::openai::OpenAiChatClient;

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

/// Finite sequence of content fragments from a streaming completion call.
/// Dropping the stream aborts the underlying upstream request.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<CompletionResponse, LlmError>;

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream, LlmError>;
}

pub fn new_client(
    config: &LlmConfig,
) -> Result<Arc<dyn ChatClient>, Box<dyn std::error::Error + Send + Sync>> {
    let client = OpenAiChatClient::from_config(config)?;
    Ok(Arc::new(client))
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use futures::stream;
    use tokio::sync::Mutex;

    /// Scripted stand-in for the upstream model, shared by orchestrator and
    /// transport tests. Records every normalized message list it is called with.
    pub struct ScriptedChatClient {
        pub reply: String,
        pub chunks: Vec<String>,
        pub fail: bool,
        pub calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedChatClient {
        pub fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                chunks: vec![reply.to_string()],
                fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn chunked(chunks: &[&str]) -> Self {
            Self {
                reply: chunks.concat(),
                chunks: chunks.iter().map(|c| c.to_string()).collect(),
                fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                reply: String::new(),
                chunks: Vec::new(),
                fail: true,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub async fn recorded_calls(&self) -> Vec<Vec<ChatMessage>> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedChatClient {
        async fn complete(
            &self,
            messages: &[ChatMessage],
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.lock().await.push(messages.to_vec());
            if self.fail {
                return Err(LlmError::Api {
                    status: 500,
                    message: "scripted upstream failure".to_string(),
                });
            }
            Ok(CompletionResponse {
                response: self.reply.clone(),
            })
        }

        async fn complete_stream(
            &self,
            messages: &[ChatMessage],
        ) -> Result<ChunkStream, LlmError> {
            self.calls.lock().await.push(messages.to_vec());
            if self.fail {
                return Err(LlmError::Api {
                    status: 500,
                    message: "scripted upstream failure".to_string(),
                });
            }
            let chunks: Vec<Result<String, LlmError>> =
                self.chunks.iter().cloned().map(Ok).collect();
            Ok(Box::pin(stream::iter(chunks)))
        }
    }
}
