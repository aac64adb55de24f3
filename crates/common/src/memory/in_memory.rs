//! Process-local turn store

use super::{next_timestamp, ConversationTurn, NewTurn, TurnStore};
use crate::errors::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// In-memory [`TurnStore`]; append order is the total order of a conversation
#[derive(Default)]
pub struct InMemoryTurnStore {
    conversations: RwLock<BTreeMap<String, Vec<ConversationTurn>>>,
}

impl InMemoryTurnStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TurnStore for InMemoryTurnStore {
    async fn append(&self, turn: NewTurn) -> Result<ConversationTurn> {
        let mut conversations = self.conversations.write().await;
        let turns = conversations.entry(turn.conversation_id.clone()).or_default();

        let timestamp = next_timestamp(Utc::now(), turns.last().map(|last| last.timestamp));

        let recorded = ConversationTurn {
            conversation_id: turn.conversation_id,
            query: turn.query,
            response: turn.response,
            context_chunks: turn.context_chunks,
            similarity_scores: turn.similarity_scores,
            timestamp,
            metadata: turn.metadata,
        };
        turns.push(recorded.clone());

        Ok(recorded)
    }

    async fn latest(&self, conversation_id: &str, limit: usize) -> Result<Vec<ConversationTurn>> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .get(conversation_id)
            .map(|turns| turns.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn all_turns(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn conversation_ids(&self) -> Result<Vec<String>> {
        Ok(self.conversations.read().await.keys().cloned().collect())
    }

    async fn count(&self) -> Result<u64> {
        let conversations = self.conversations.read().await;
        Ok(conversations.values().map(|turns| turns.len() as u64).sum())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<u64> {
        let mut conversations = self.conversations.write().await;
        Ok(conversations
            .remove(conversation_id)
            .map(|turns| turns.len() as u64)
            .unwrap_or(0))
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut conversations = self.conversations.write().await;
        let removed = conversations.values().map(|turns| turns.len() as u64).sum();
        conversations.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_is_newest_first() {
        let store = InMemoryTurnStore::new();
        for i in 0..4 {
            store
                .append(NewTurn::new("c", format!("q{i}"), "r"))
                .await
                .unwrap();
        }

        let latest = store.latest("c", 2).await.unwrap();
        assert_eq!(latest[0].query, "q3");
        assert_eq!(latest[1].query, "q2");
        assert_eq!(store.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_delete_all_reports_turns() {
        let store = InMemoryTurnStore::new();
        store.append(NewTurn::new("a", "q", "r")).await.unwrap();
        store.append(NewTurn::new("b", "q", "r")).await.unwrap();

        assert_eq!(store.delete_all().await.unwrap(), 2);
        assert!(store.conversation_ids().await.unwrap().is_empty());
    }
}
