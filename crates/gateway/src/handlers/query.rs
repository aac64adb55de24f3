//! Query handler

use axum::{extract::State, Json};
use netrag_common::errors::Result;
use netrag_context::QueryAnswer;
use serde::Deserialize;
use validator::Validate;

use super::validate_request;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 4000))]
    pub query: String,

    /// Continue an existing conversation; a new one is started when absent
    #[serde(default)]
    #[validate(length(max = 128))]
    pub conversation_id: Option<String>,
}

/// Answer a query through the routed provider
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryAnswer>> {
    validate_request(&request)?;

    let answer = state
        .orchestrator
        .answer(&request.query, request.conversation_id.as_deref())
        .await?;

    Ok(Json(answer))
}
