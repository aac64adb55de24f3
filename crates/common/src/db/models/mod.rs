//! SeaORM entity models
//!
//! The `embeddings` table is accessed through raw SQL because of its
//! pgvector column; only conversation turns have an entity.

mod conversation_turn;

pub use conversation_turn::{
    ActiveModel as ConversationTurnActiveModel, Column as ConversationTurnColumn,
    Entity as ConversationTurnEntity, Model as ConversationTurnRow,
};
