//! Search handlers

use axum::{extract::State, Json};
use netrag_common::{errors::Result, metrics, Metadata, ScoredRecord};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use super::validate_request;
use crate::AppState;

/// Below any cosine similarity, so every record qualifies
const NO_THRESHOLD: f32 = -2.0;

/// Search by a precomputed query vector
#[derive(Debug, Deserialize, Validate)]
pub struct VectorSearchRequest {
    #[validate(length(min = 1))]
    pub query_vector: Vec<f32>,

    #[serde(default = "default_top_k")]
    #[validate(range(min = 1, max = 100))]
    pub top_k: usize,

    #[serde(default)]
    #[validate(range(min = -1.0, max = 1.0))]
    pub min_similarity: Option<f32>,
}

/// Search by text, embedded server-side
#[derive(Debug, Deserialize, Validate)]
pub struct TextSearchRequest {
    #[validate(length(min = 1, max = 4000))]
    pub query_text: String,

    #[serde(default = "default_top_k")]
    #[validate(range(min = 1, max = 100))]
    pub top_k: usize,

    #[serde(default)]
    #[validate(range(min = -1.0, max = 1.0))]
    pub min_similarity: Option<f32>,
}

fn default_top_k() -> usize {
    netrag_common::DEFAULT_TOP_K
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub total_results: usize,
    pub results: Vec<SearchResultItem>,
    pub processing_time_ms: u64,
}

#[derive(Serialize)]
pub struct SearchResultItem {
    pub id: i64,
    pub text: String,
    pub source_document: Option<String>,
    pub metadata: Metadata,
    pub similarity: f32,
}

impl From<ScoredRecord> for SearchResultItem {
    fn from(hit: ScoredRecord) -> Self {
        Self {
            id: hit.record.id,
            text: hit.record.text,
            source_document: hit.record.source_document,
            metadata: hit.record.metadata,
            similarity: hit.similarity,
        }
    }
}

/// Nearest stored chunks to a query vector
pub async fn search_by_vector(
    State(state): State<AppState>,
    Json(request): Json<VectorSearchRequest>,
) -> Result<Json<SearchResponse>> {
    validate_request(&request)?;
    let start = Instant::now();

    let hits = state
        .store
        .search(
            &request.query_vector,
            request.top_k,
            request.min_similarity.unwrap_or(NO_THRESHOLD),
        )
        .await?;

    Ok(Json(respond(hits, start)))
}

/// Nearest stored chunks to the embedding of a query text
pub async fn search_by_text(
    State(state): State<AppState>,
    Json(request): Json<TextSearchRequest>,
) -> Result<Json<SearchResponse>> {
    validate_request(&request)?;
    let start = Instant::now();

    let vector = state.embedder.embed(&request.query_text).await?;
    let hits = state
        .store
        .search(
            &vector,
            request.top_k,
            request.min_similarity.unwrap_or(NO_THRESHOLD),
        )
        .await?;

    Ok(Json(respond(hits, start)))
}

fn respond(hits: Vec<ScoredRecord>, start: Instant) -> SearchResponse {
    let elapsed = start.elapsed();
    metrics::record_retrieval(elapsed, hits.len());
    tracing::info!(
        results = hits.len(),
        latency_ms = elapsed.as_millis() as u64,
        "Search completed"
    );

    SearchResponse {
        total_results: hits.len(),
        results: hits.into_iter().map(SearchResultItem::from).collect(),
        processing_time_ms: elapsed.as_millis() as u64,
    }
}
