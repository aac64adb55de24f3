//! pgvector-backed embedding store
//!
//! Vector columns go through raw SQL: vectors are bound as pgvector text
//! literals and read back with `vector::text`.

use super::{
    check_query, content_hash, validate_new, EmbeddingRecord, EmbeddingStore, NewEmbedding,
    ScoredRecord, Upserted,
};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::Metadata;
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DbBackend, QueryResult, Statement};
use tracing::debug;

const RECORD_COLUMNS: &str =
    "id, text, vector::text AS vector, content_hash, source_document, metadata";

/// [`EmbeddingStore`] over the `embeddings` table
#[derive(Clone)]
pub struct PgEmbeddingStore {
    pool: DbPool,
    dimension: usize,
}

impl PgEmbeddingStore {
    pub fn new(pool: DbPool, dimension: usize) -> Self {
        Self { pool, dimension }
    }

    fn record_from_row(row: &QueryResult) -> Result<EmbeddingRecord> {
        let vector_text: String = row.try_get("", "vector")?;
        let vector = parse_vector(&vector_text).ok_or_else(|| AppError::Internal {
            message: format!("Unparsable vector literal in embeddings row: {}", vector_text),
        })?;

        let metadata = match row.try_get::<serde_json::Value>("", "metadata")? {
            serde_json::Value::Object(map) => map,
            _ => Metadata::new(),
        };

        Ok(EmbeddingRecord {
            id: row.try_get("", "id")?,
            text: row.try_get("", "text")?,
            vector,
            content_hash: row.try_get("", "content_hash")?,
            source_document: row.try_get("", "source_document")?,
            metadata,
        })
    }
}

#[async_trait]
impl EmbeddingStore for PgEmbeddingStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<EmbeddingRecord>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!("SELECT {RECORD_COLUMNS} FROM embeddings WHERE content_hash = $1"),
            vec![content_hash.into()],
        );

        self.pool
            .conn()
            .query_one(stmt)
            .await?
            .map(|row| Self::record_from_row(&row))
            .transpose()
    }

    async fn upsert(&self, new: NewEmbedding) -> Result<Upserted> {
        let normalized = validate_new(&new, self.dimension)?;
        let hash = content_hash(&normalized);

        // The unique constraint arbitrates races; losers fall through to a fetch
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!(
                r#"
                INSERT INTO embeddings (text, vector, content_hash, source_document, metadata, created_at)
                VALUES ($1, $2::vector, $3, $4, $5, NOW())
                ON CONFLICT (content_hash) DO NOTHING
                RETURNING {RECORD_COLUMNS}
                "#
            ),
            vec![
                new.text.into(),
                format_vector(&new.vector).into(),
                hash.clone().into(),
                new.source_document.into(),
                serde_json::Value::Object(new.metadata).into(),
            ],
        );

        if let Some(row) = self.pool.conn().query_one(stmt).await? {
            return Ok(Upserted {
                record: Self::record_from_row(&row)?,
                inserted: true,
            });
        }

        debug!(content_hash = %hash, "Embedding already stored, returning existing record");

        let record = self.find_by_hash(&hash).await?.ok_or_else(|| AppError::Internal {
            message: format!("Embedding {} vanished after conflicting insert", hash),
        })?;

        Ok(Upserted {
            record,
            inserted: false,
        })
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredRecord>> {
        if !check_query(query, self.dimension, top_k)? {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS}, similarity
            FROM (
                SELECT *, 1 - (vector <=> $1::vector) AS similarity
                FROM embeddings
            ) scored
            WHERE similarity > $2 AND similarity <> 'NaN'::float8
            ORDER BY similarity DESC, id ASC
            LIMIT $3
            "#
        );

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            vec![
                format_vector(query).into(),
                (min_similarity as f64).into(),
                (top_k as i64).into(),
            ],
        );

        let rows = self.pool.conn().query_all(stmt).await?;

        rows.iter()
            .map(|row| {
                let similarity: f64 = row.try_get("", "similarity")?;
                Ok(ScoredRecord {
                    record: Self::record_from_row(row)?,
                    similarity: similarity as f32,
                })
            })
            .collect()
    }

    async fn count(&self) -> Result<u64> {
        let stmt = Statement::from_string(
            DbBackend::Postgres,
            "SELECT COUNT(*) AS total FROM embeddings",
        );

        let total: i64 = match self.pool.conn().query_one(stmt).await? {
            Some(row) => row.try_get("", "total")?,
            None => 0,
        };

        Ok(total as u64)
    }

    async fn delete_all(&self) -> Result<u64> {
        let stmt = Statement::from_string(DbBackend::Postgres, "DELETE FROM embeddings");
        let result = self.pool.conn().execute(stmt).await?;
        Ok(result.rows_affected())
    }
}

/// Convert a vector to pgvector text format "[1,2,3]"
fn format_vector(vector: &[f32]) -> String {
    format!(
        "[{}]",
        vector
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Parse pgvector text format back to floats
fn parse_vector(text: &str) -> Option<Vec<f32>> {
    let inner = text.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|v| v.trim().parse::<f32>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_format() {
        assert_eq!(format_vector(&[0.1, 0.2, 0.3]), "[0.1,0.2,0.3]");
        assert_eq!(format_vector(&[]), "[]");
    }

    #[test]
    fn test_vector_parse() {
        assert_eq!(parse_vector("[0.1,0.2, 0.3]"), Some(vec![0.1, 0.2, 0.3]));
        assert_eq!(parse_vector("[]"), Some(vec![]));
        assert_eq!(parse_vector("[0.1,abc]"), None);
    }
}
