//! Conversation history handlers

use axum::{
    extract::{Path, State},
    Json,
};
use netrag_common::{errors::Result, ConversationTurn};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<String>,
}

#[derive(Serialize)]
pub struct ConversationResponse {
    pub conversation_id: String,
    pub turns: Vec<ConversationTurn>,
}

#[derive(Serialize)]
pub struct ConversationDeletedResponse {
    pub conversation_id: String,
    pub deleted: u64,
}

pub async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<ConversationListResponse>> {
    let conversations = state.orchestrator.memory().list_conversations().await?;
    Ok(Json(ConversationListResponse { conversations }))
}

/// Full history, oldest first; an unknown id yields no turns
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationResponse>> {
    let turns = state.orchestrator.memory().history(&conversation_id).await?;
    Ok(Json(ConversationResponse {
        conversation_id,
        turns,
    }))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationDeletedResponse>> {
    let deleted = state
        .orchestrator
        .memory()
        .delete_conversation(&conversation_id)
        .await?;

    tracing::info!(%conversation_id, deleted, "Conversation deleted");
    Ok(Json(ConversationDeletedResponse {
        conversation_id,
        deleted,
    }))
}
