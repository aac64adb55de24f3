//! Capability listing and maintenance handlers

use axum::{extract::State, Json};
use netrag_common::errors::Result;
use netrag_context::ProviderDescriptor;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct CapabilitiesResponse {
    pub providers: Vec<ProviderDescriptor>,
}

#[derive(Serialize)]
pub struct TableCountsResponse {
    pub embeddings: u64,
    pub conversation_turns: u64,
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

/// Provider descriptors in selection order
pub async fn capabilities(State(state): State<AppState>) -> Json<CapabilitiesResponse> {
    Json(CapabilitiesResponse {
        providers: state.orchestrator.capabilities(),
    })
}

pub async fn table_counts(State(state): State<AppState>) -> Result<Json<TableCountsResponse>> {
    let embeddings = state.store.count().await?;
    let conversation_turns = state.orchestrator.memory().count_turns().await?;

    Ok(Json(TableCountsResponse {
        embeddings,
        conversation_turns,
    }))
}

pub async fn clear_embeddings(State(state): State<AppState>) -> Result<Json<DeletedResponse>> {
    let deleted = state.store.delete_all().await?;
    tracing::warn!(deleted, "All embeddings deleted");
    Ok(Json(DeletedResponse { deleted }))
}

pub async fn clear_conversations(State(state): State<AppState>) -> Result<Json<DeletedResponse>> {
    let deleted = state.orchestrator.memory().delete_all().await?;
    tracing::warn!(deleted, "All conversation turns deleted");
    Ok(Json(DeletedResponse { deleted }))
}
