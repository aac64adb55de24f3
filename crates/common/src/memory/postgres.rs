//! Turn store over the `conversation_turns` table

use super::{next_timestamp, ConversationTurn, NewTurn, TurnStore};
use crate::db::models::{
    ConversationTurnActiveModel, ConversationTurnColumn, ConversationTurnEntity,
    ConversationTurnRow,
};
use crate::db::DbPool;
use crate::errors::Result;
use crate::Metadata;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, Statement, TransactionTrait,
};

/// [`TurnStore`] backed by Postgres. Row ids give the per-conversation order.
#[derive(Clone)]
pub struct PgTurnStore {
    pool: DbPool,
}

impl PgTurnStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl TryFrom<ConversationTurnRow> for ConversationTurn {
    type Error = crate::errors::AppError;

    fn try_from(row: ConversationTurnRow) -> Result<Self> {
        let similarity_scores = row
            .similarity_scores
            .map(serde_json::from_value::<Vec<f32>>)
            .transpose()?;

        let metadata = match row.metadata {
            serde_json::Value::Object(map) => map,
            _ => Metadata::new(),
        };

        Ok(Self {
            conversation_id: row.conversation_id,
            query: row.query,
            response: row.response,
            context_chunks: serde_json::from_value(row.context_chunks)?,
            similarity_scores,
            timestamp: row.created_at.with_timezone(&Utc),
            metadata,
        })
    }
}

#[async_trait]
impl TurnStore for PgTurnStore {
    async fn append(&self, turn: NewTurn) -> Result<ConversationTurn> {
        let txn = self.pool.conn().begin().await?;

        // Appends to one conversation are serialized, so id order and
        // timestamp order agree
        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT pg_advisory_xact_lock(hashtext($1))",
            vec![turn.conversation_id.clone().into()],
        ))
        .await?;

        let latest = ConversationTurnEntity::find()
            .filter(ConversationTurnColumn::ConversationId.eq(turn.conversation_id.as_str()))
            .order_by_desc(ConversationTurnColumn::Id)
            .one(&txn)
            .await?
            .map(|row| row.created_at.with_timezone(&Utc));
        let timestamp = next_timestamp(Utc::now(), latest);

        let model = ConversationTurnActiveModel {
            conversation_id: Set(turn.conversation_id),
            query: Set(turn.query),
            response: Set(turn.response),
            context_chunks: Set(serde_json::to_value(&turn.context_chunks)?),
            similarity_scores: Set(turn
                .similarity_scores
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?),
            metadata: Set(serde_json::Value::Object(turn.metadata)),
            created_at: Set(timestamp.fixed_offset()),
            ..Default::default()
        };

        let row = model.insert(&txn).await?;
        txn.commit().await?;
        ConversationTurn::try_from(row)
    }

    async fn latest(&self, conversation_id: &str, limit: usize) -> Result<Vec<ConversationTurn>> {
        ConversationTurnEntity::find()
            .filter(ConversationTurnColumn::ConversationId.eq(conversation_id))
            .order_by_desc(ConversationTurnColumn::Id)
            .limit(limit as u64)
            .all(self.pool.conn())
            .await?
            .into_iter()
            .map(ConversationTurn::try_from)
            .collect()
    }

    async fn all_turns(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>> {
        ConversationTurnEntity::find()
            .filter(ConversationTurnColumn::ConversationId.eq(conversation_id))
            .order_by_asc(ConversationTurnColumn::Id)
            .all(self.pool.conn())
            .await?
            .into_iter()
            .map(ConversationTurn::try_from)
            .collect()
    }

    async fn conversation_ids(&self) -> Result<Vec<String>> {
        let ids = ConversationTurnEntity::find()
            .select_only()
            .column(ConversationTurnColumn::ConversationId)
            .distinct()
            .order_by_asc(ConversationTurnColumn::ConversationId)
            .into_tuple::<String>()
            .all(self.pool.conn())
            .await?;

        Ok(ids)
    }

    async fn count(&self) -> Result<u64> {
        Ok(ConversationTurnEntity::find().count(self.pool.conn()).await?)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<u64> {
        let result = ConversationTurnEntity::delete_many()
            .filter(ConversationTurnColumn::ConversationId.eq(conversation_id))
            .exec(self.pool.conn())
            .await?;

        Ok(result.rows_affected)
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = ConversationTurnEntity::delete_many()
            .exec(self.pool.conn())
            .await?;

        Ok(result.rows_affected)
    }
}
