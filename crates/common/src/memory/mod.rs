//! Conversation memory
//!
//! Append-only per-conversation log of query/response turns. Reads of an
//! unknown conversation return no turns rather than an error, so a fresh
//! conversation looks exactly like an empty one.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryTurnStore;
pub use postgres::PgTurnStore;

use crate::errors::Result;
use crate::Metadata;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Separator line between rendered turns
pub const TURN_DELIMITER: &str = "---";

/// Timestamp for a new turn: now, unless the conversation's latest turn is
/// already later. Keeps timestamps non-decreasing in append order.
pub(crate) fn next_timestamp(now: DateTime<Utc>, latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match latest {
        Some(latest) if latest > now => latest,
        _ => now,
    }
}

/// One recorded query/response exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub conversation_id: String,
    pub query: String,
    pub response: String,
    /// Context strings actually used to answer, in prompt order
    pub context_chunks: Vec<String>,
    /// Parallel to `context_chunks` when present
    pub similarity_scores: Option<Vec<f32>>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A turn about to be recorded
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub conversation_id: String,
    pub query: String,
    pub response: String,
    pub context_chunks: Vec<String>,
    pub similarity_scores: Option<Vec<f32>>,
    pub metadata: Metadata,
}

impl NewTurn {
    pub fn new(
        conversation_id: impl Into<String>,
        query: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            query: query.into(),
            response: response.into(),
            context_chunks: Vec::new(),
            similarity_scores: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_context(mut self, chunks: Vec<String>, scores: Option<Vec<f32>>) -> Self {
        self.context_chunks = chunks;
        self.similarity_scores = scores;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Durable storage for conversation turns
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Append a turn, stamping it with the current time
    async fn append(&self, turn: NewTurn) -> Result<ConversationTurn>;

    /// Up to `limit` turns, newest first
    async fn latest(&self, conversation_id: &str, limit: usize) -> Result<Vec<ConversationTurn>>;

    /// Every turn, oldest first
    async fn all_turns(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>>;

    /// Ids of conversations with at least one turn
    async fn conversation_ids(&self) -> Result<Vec<String>>;

    /// Total number of stored turns
    async fn count(&self) -> Result<u64>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<u64>;

    async fn delete_all(&self) -> Result<u64>;
}

/// Bounded recent-history access over a [`TurnStore`]
#[derive(Clone)]
pub struct ConversationMemory {
    store: Arc<dyn TurnStore>,
    window: usize,
}

impl ConversationMemory {
    /// `window` is the default number of turns fed into prompts
    pub fn new(store: Arc<dyn TurnStore>, window: usize) -> Self {
        Self { store, window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// New random conversation id. Nothing is written until the first turn.
    pub fn start_conversation(&self) -> String {
        Uuid::new_v4().to_string()
    }

    pub async fn record_turn(&self, turn: NewTurn) -> Result<ConversationTurn> {
        let recorded = self.store.append(turn).await?;

        tracing::debug!(
            conversation_id = %recorded.conversation_id,
            context_chunks = recorded.context_chunks.len(),
            "Turn recorded"
        );

        Ok(recorded)
    }

    /// The most recent `window_size` turns, oldest first
    pub async fn recent_history(
        &self,
        conversation_id: &str,
        window_size: usize,
    ) -> Result<Vec<ConversationTurn>> {
        if window_size == 0 {
            return Ok(Vec::new());
        }

        let mut turns = self.store.latest(conversation_id, window_size).await?;
        turns.reverse();
        Ok(turns)
    }

    /// Full chronological history of one conversation
    pub async fn history(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>> {
        self.store.all_turns(conversation_id).await
    }

    /// Render turns as `User:`/`Assistant:` pairs, each followed by a delimiter
    pub fn format_for_prompt(turns: &[ConversationTurn]) -> String {
        turns
            .iter()
            .map(|turn| {
                format!(
                    "User: {}\nAssistant: {}\n{}",
                    turn.query, turn.response, TURN_DELIMITER
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn list_conversations(&self) -> Result<Vec<String>> {
        self.store.conversation_ids().await
    }

    pub async fn count_turns(&self) -> Result<u64> {
        self.store.count().await
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<u64> {
        let removed = self.store.delete_conversation(conversation_id).await?;
        tracing::info!(conversation_id, removed, "Conversation deleted");
        Ok(removed)
    }

    pub async fn delete_all(&self) -> Result<u64> {
        let removed = self.store.delete_all().await?;
        tracing::info!(removed, "All conversations deleted");
        Ok(removed)
    }
}
