//! Content-addressed embedding store
//!
//! Records are keyed by a digest of their normalized text, so ingesting the
//! same chunk twice yields a single record. Search is exact cosine similarity
//! with a hard threshold, ordered by descending similarity and then by
//! ascending id.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryEmbeddingStore;
pub use postgres::PgEmbeddingStore;

use crate::errors::{AppError, Result};
use crate::Metadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

/// A stored chunk and its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Stable surrogate key, increasing in insertion order
    pub id: i64,

    /// Chunk content
    pub text: String,

    /// Embedding vector, `dimension` long
    pub vector: Vec<f32>,

    /// Hex SHA-256 of the normalized text
    pub content_hash: String,

    /// Origin of the chunk (URL, filename)
    pub source_document: Option<String>,

    #[serde(default)]
    pub metadata: Metadata,
}

/// Input for [`EmbeddingStore::upsert`]
#[derive(Debug, Clone)]
pub struct NewEmbedding {
    pub text: String,
    pub vector: Vec<f32>,
    pub source_document: Option<String>,
    pub metadata: Metadata,
}

impl NewEmbedding {
    pub fn new(text: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            text: text.into(),
            vector,
            source_document: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source_document = source;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Result of [`EmbeddingStore::upsert`]
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    pub record: EmbeddingRecord,
    /// False when a record with the same content hash already existed
    pub inserted: bool,
}

/// Search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: EmbeddingRecord,
    pub similarity: f32,
}

/// Deduplicated, similarity-searchable embedding storage
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Vector length accepted by this store
    fn dimension(&self) -> usize;

    /// Look up a record by content hash
    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<EmbeddingRecord>>;

    /// Insert a record, or return the existing one with the same content hash.
    ///
    /// Concurrent calls for the same text converge on one stored record, and
    /// exactly one of them reports `inserted`.
    async fn upsert(&self, new: NewEmbedding) -> Result<Upserted>;

    /// Records with similarity strictly above `min_similarity`, best first,
    /// at most `top_k` of them
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredRecord>>;

    /// Number of stored records
    async fn count(&self) -> Result<u64>;

    /// Remove every record, returning how many were deleted
    async fn delete_all(&self) -> Result<u64>;
}

/// Trim and collapse whitespace runs to a single space
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Uniqueness key for a chunk of text
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(normalize_text(text).as_bytes()))
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Apply the retrieval policy: threshold, order, truncate
pub fn rank(
    candidates: impl IntoIterator<Item = ScoredRecord>,
    top_k: usize,
    min_similarity: f32,
) -> Vec<ScoredRecord> {
    let mut hits: Vec<ScoredRecord> = candidates
        .into_iter()
        .filter(|hit| hit.similarity > min_similarity)
        .collect();

    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then(a.record.id.cmp(&b.record.id))
    });
    hits.truncate(top_k);
    hits
}

/// Shared input checks for upserts
pub(crate) fn validate_new(new: &NewEmbedding, dimension: usize) -> Result<String> {
    let normalized = normalize_text(&new.text);
    if normalized.is_empty() {
        return Err(AppError::validation("text", "chunk text must not be empty"));
    }
    check_dimension(&new.vector, dimension)?;
    Ok(normalized)
}

/// Pre-search checks shared by every backend. `Ok(false)` means the search
/// has no possible hits: `top_k` is zero or the query has no direction, so
/// its cosine similarity to anything is undefined.
pub(crate) fn check_query(query: &[f32], dimension: usize, top_k: usize) -> Result<bool> {
    check_dimension(query, dimension)?;
    if top_k == 0 {
        return Ok(false);
    }
    let norm: f32 = query.iter().map(|v| v * v).sum();
    Ok(norm.is_finite() && norm > 0.0)
}

pub(crate) fn check_dimension(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(AppError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    Ok(())
}
