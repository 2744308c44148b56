use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use log::info;
use serde_json::json;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_stream::wrappers::ReceiverStream;

use crate::cli::Args;
use crate::history::{initialize_history_store, HistoryError, HistoryStore};
use crate::llm::chat::{new_client, ChatClient};
use crate::llm::{LlmConfig, LlmError};
use crate::models::api::StreamEvent;
use crate::models::chat::{ChatMessage, Conversation, Role};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Provide clear, concise, and helpful responses.";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Result of a blocking chat turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub message: String,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, AgentError>> + Send>>;

/// Sequences each chat turn through normalize -> invoke -> record. The
/// blocking and streaming paths share the normalize and record steps and
/// differ only in how the model output reaches the caller.
pub struct ChatAgent {
    chat_client: Arc<dyn ChatClient>,
    history: Arc<dyn HistoryStore>,
    system_prompt: String,
    context_limit: usize,
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChatAgent {
    pub fn new(args: &Args) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let chat_config = LlmConfig {
            api_key: Some(args.chat_api_key.clone()).filter(|k| !k.is_empty()),
            completion_model: args.chat_model.clone(),
            base_url: Some(args.chat_base_url.clone()),
            timeout_secs: args.chat_timeout_secs,
        };
        let chat_client = new_client(&chat_config)?;
        info!(
            "Chat client configured: Model={:?}, BaseURL={}",
            chat_config.completion_model.as_deref().unwrap_or("adapter default"),
            args.chat_base_url
        );

        let history = initialize_history_store(args);
        let system_prompt = args
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        Ok(Self::with_parts(
            chat_client,
            history,
            system_prompt,
            args.history_context_limit,
        ))
    }

    pub fn with_parts(
        chat_client: Arc<dyn ChatClient>,
        history: Arc<dyn HistoryStore>,
        system_prompt: String,
        context_limit: usize,
    ) -> Self {
        Self {
            chat_client,
            history,
            system_prompt,
            context_limit,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Conversation, HistoryError> {
        self.history.get(conversation_id).await
    }

    /// At most one turn per conversation id may be in flight; later turns
    /// wait here until the earlier one has recorded its result.
    async fn turn_lock(&self, conversation_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.turn_locks.lock().await;
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            Arc::clone(
                locks
                    .entry(conversation_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Normalize step: stored history plus the new user message, with the
    /// system prompt prepended exactly when the working list has one entry,
    /// i.e. on the conversation's first turn.
    async fn working_messages(
        &self,
        conversation_id: &str,
        user_message: &ChatMessage,
    ) -> Vec<ChatMessage> {
        let mut messages = match self.history.get(conversation_id).await {
            Ok(conversation) => {
                let mut stored = conversation.messages;
                if stored.len() > self.context_limit {
                    stored.drain(..stored.len() - self.context_limit);
                }
                stored
            }
            Err(HistoryError::NotFound(_)) => Vec::new(),
        };

        messages.push(user_message.clone());
        if messages.len() == 1 {
            messages.insert(0, ChatMessage::new(Role::System, self.system_prompt.clone()));
        }
        messages
    }

    /// Record step: runs only after a successful model call.
    async fn record(
        &self,
        conversation_id: &str,
        user_id: &str,
        user_message: ChatMessage,
        assistant_message: ChatMessage,
    ) -> Result<(), HistoryError> {
        let last_response = assistant_message.content.clone();
        self.history
            .append(conversation_id, user_id, vec![user_message, assistant_message])
            .await?;
        let conversation = self.history.get(conversation_id).await?;
        self.history
            .update_context(conversation_id, "last_response", json!(last_response))
            .await?;
        self.history
            .update_context(
                conversation_id,
                "message_count",
                json!(conversation.messages.len()),
            )
            .await?;
        Ok(())
    }

    pub async fn chat(
        &self,
        user_message: &str,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let _guard = self.turn_lock(conversation_id).await;

        let user_msg = ChatMessage::new(Role::User, user_message);
        let messages = self.working_messages(conversation_id, &user_msg).await;

        let completion = self.chat_client.complete(&messages).await?;

        let assistant_msg = ChatMessage::new(Role::Assistant, completion.response);
        let timestamp = assistant_msg.timestamp;
        let message = assistant_msg.content.clone();
        self.record(conversation_id, user_id, user_msg, assistant_msg)
            .await?;

        Ok(TurnOutcome {
            message,
            conversation_id: conversation_id.to_string(),
            timestamp,
        })
    }

    /// Streaming variant: content events as the upstream emits them, then the
    /// record step, then a terminal complete event. If the consumer drops the
    /// stream early the upstream call is aborted and nothing is recorded.
    pub fn chat_stream(
        self: Arc<Self>,
        user_message: String,
        user_id: String,
        conversation_id: String,
    ) -> EventStream {
        let (tx, rx) = mpsc::channel::<Result<StreamEvent, AgentError>>(32);

        tokio::spawn(async move {
            let _guard = self.turn_lock(&conversation_id).await;
            if let Err(e) = self
                .stream_turn(&tx, &user_message, &user_id, &conversation_id)
                .await
            {
                let _ = tx.send(Err(e)).await;
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn stream_turn(
        &self,
        tx: &mpsc::Sender<Result<StreamEvent, AgentError>>,
        user_message: &str,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<(), AgentError> {
        let user_msg = ChatMessage::new(Role::User, user_message);
        let messages = self.working_messages(conversation_id, &user_msg).await;

        let mut chunks = self.chat_client.complete_stream(&messages).await?;

        let mut full_response = String::new();
        while let Some(chunk) = chunks.next().await {
            let content = chunk?;
            full_response.push_str(&content);
            if tx
                .send(Ok(StreamEvent::Content { content }))
                .await
                .is_err()
            {
                // Client went away; dropping `chunks` aborts the upstream call.
                return Ok(());
            }
        }

        let assistant_msg = ChatMessage::new(Role::Assistant, full_response);
        let timestamp = assistant_msg.timestamp;
        self.record(conversation_id, user_id, user_msg, assistant_msg)
            .await?;

        let _ = tx
            .send(Ok(StreamEvent::Complete {
                conversation_id: conversation_id.to_string(),
                timestamp,
            }))
            .await;
        Ok(())
    }
}
