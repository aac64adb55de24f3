//! Ingestion handler

use axum::{extract::State, Json};
use netrag_common::{errors::Result, Metadata};
use netrag_context::IndexReport;
use serde::Deserialize;
use validator::Validate;

use super::validate_request;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct IngestTextRequest {
    #[validate(length(min = 1))]
    pub text: String,

    #[serde(default)]
    pub source_document: Option<String>,

    #[serde(default)]
    pub metadata: Metadata,
}

/// Chunk, embed and store a document; chunks already stored are skipped
pub async fn ingest_text(
    State(state): State<AppState>,
    Json(request): Json<IngestTextRequest>,
) -> Result<Json<IndexReport>> {
    validate_request(&request)?;

    let report = state
        .indexer
        .index_document(&request.text, request.source_document, request.metadata)
        .await?;

    Ok(Json(report))
}
