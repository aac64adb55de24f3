//! API handlers module

pub mod admin;
pub mod conversations;
pub mod health;
pub mod ingest;
pub mod query;
pub mod search;

use netrag_common::errors::{AppError, Result};
use validator::Validate;

/// Run derive-based request validation
pub(crate) fn validate_request<T: Validate>(request: &T) -> Result<()> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })
}
