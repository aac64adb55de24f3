//! Conversation turn entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversation_turns")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub conversation_id: String,

    #[sea_orm(column_type = "Text")]
    pub query: String,

    #[sea_orm(column_type = "Text")]
    pub response: String,

    /// Ordered context strings used for this turn
    #[sea_orm(column_type = "JsonBinary")]
    pub context_chunks: Json,

    /// Scores parallel to `context_chunks`, when the context came from retrieval
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub similarity_scores: Option<Json>,

    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Json,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
