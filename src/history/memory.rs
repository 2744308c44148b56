use async_trait::async_trait;
use chrono::Utc;
use log::info;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{HistoryError, HistoryStore};
use crate::models::chat::{ChatMessage, Conversation};

struct Entry {
    conversation: Conversation,
    last_touched: u64,
}

struct Inner {
    conversations: HashMap<String, Entry>,
    // Monotonic touch counter; the entry with the smallest value is the
    // least recently used one.
    clock: u64,
}

/// Process-lifetime conversation store, bounded to `max_conversations`
/// entries with least-recently-used eviction.
pub struct MemoryHistoryStore {
    inner: RwLock<Inner>,
    max_conversations: usize,
}

impl MemoryHistoryStore {
    pub fn new(max_conversations: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                conversations: HashMap::new(),
                clock: 0,
            }),
            max_conversations: max_conversations.max(1),
        }
    }
}

impl Inner {
    fn touch(&mut self, conversation_id: &str) {
        self.clock += 1;
        if let Some(entry) = self.conversations.get_mut(conversation_id) {
            entry.last_touched = self.clock;
        }
    }

    fn evict_lru(&mut self) {
        let lru = self
            .conversations
            .iter()
            .min_by_key(|(_, entry)| entry.last_touched)
            .map(|(id, _)| id.clone());
        if let Some(id) = lru {
            info!("Evicting least recently used conversation: {}", id);
            self.conversations.remove(&id);
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(
        &self,
        conversation_id: &str,
        user_id: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<(), HistoryError> {
        let mut inner = self.inner.write().await;

        if !inner.conversations.contains_key(conversation_id) {
            if inner.conversations.len() >= self.max_conversations {
                inner.evict_lru();
            }
            let now = Utc::now();
            inner.conversations.insert(
                conversation_id.to_string(),
                Entry {
                    conversation: Conversation {
                        id: conversation_id.to_string(),
                        user_id: user_id.to_string(),
                        messages: Vec::new(),
                        context: HashMap::new(),
                        created_at: now,
                        updated_at: now,
                    },
                    last_touched: 0,
                },
            );
        }

        inner.touch(conversation_id);
        let entry = inner
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| HistoryError::NotFound(conversation_id.to_string()))?;
        entry.conversation.messages.extend(messages);
        entry.conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, conversation_id: &str) -> Result<Conversation, HistoryError> {
        let mut inner = self.inner.write().await;
        inner.touch(conversation_id);
        inner
            .conversations
            .get(conversation_id)
            .map(|entry| entry.conversation.clone())
            .ok_or_else(|| HistoryError::NotFound(conversation_id.to_string()))
    }

    async fn update_context(
        &self,
        conversation_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), HistoryError> {
        let mut inner = self.inner.write().await;
        inner.touch(conversation_id);
        let entry = inner
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| HistoryError::NotFound(conversation_id.to_string()))?;
        entry.conversation.context.insert(key.to_string(), value);
        entry.conversation.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    fn msg(role: Role, content: &str) -> ChatMessage {
        ChatMessage::new(role, content)
    }

    #[tokio::test]
    async fn append_then_get_returns_messages_in_order() {
        let store = MemoryHistoryStore::new(8);
        store
            .append("c1", "u1", vec![msg(Role::User, "one"), msg(Role::Assistant, "two")])
            .await
            .unwrap();
        store
            .append("c1", "u1", vec![msg(Role::User, "three")])
            .await
            .unwrap();

        let conversation = store.get("c1").await.unwrap();
        assert_eq!(conversation.user_id, "u1");
        let contents: Vec<&str> = conversation
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn get_unknown_conversation_is_not_found() {
        let store = MemoryHistoryStore::new(8);
        assert!(matches!(
            store.get("missing").await,
            Err(HistoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn eviction_drops_least_recently_used() {
        let store = MemoryHistoryStore::new(2);
        store.append("a", "u", vec![msg(Role::User, "1")]).await.unwrap();
        store.append("b", "u", vec![msg(Role::User, "2")]).await.unwrap();

        // Touch "a" so "b" becomes the eviction candidate.
        store.get("a").await.unwrap();
        store.append("c", "u", vec![msg(Role::User, "3")]).await.unwrap();

        assert!(store.get("a").await.is_ok());
        assert!(store.get("c").await.is_ok());
        assert!(matches!(store.get("b").await, Err(HistoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_context_sets_keys() {
        let store = MemoryHistoryStore::new(8);
        store.append("c1", "u1", vec![msg(Role::User, "hi")]).await.unwrap();
        store
            .update_context("c1", "message_count", serde_json::json!(1))
            .await
            .unwrap();

        let conversation = store.get("c1").await.unwrap();
        assert_eq!(conversation.context["message_count"], serde_json::json!(1));
    }
}
