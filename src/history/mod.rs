mod memory;

pub use memory::MemoryHistoryStore;

use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use thiserror::Error;

use crate::cli::Args;
use crate::models::chat::{ChatMessage, Conversation};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("conversation not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends messages to a conversation, creating it on first use.
    async fn append(
        &self,
        conversation_id: &str,
        user_id: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<(), HistoryError>;

    async fn get(&self, conversation_id: &str) -> Result<Conversation, HistoryError>;

    async fn update_context(
        &self,
        conversation_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), HistoryError>;
}

pub fn initialize_history_store(args: &Args) -> Arc<dyn HistoryStore> {
    info!(
        "Chat history will be stored in memory (max {} conversations)",
        args.history_max_conversations
    );
    Arc::new(MemoryHistoryStore::new(args.history_max_conversations))
}
