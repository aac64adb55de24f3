//! Schema bootstrap
//!
//! Statements are idempotent so every process can run them on startup.

use super::DbPool;
use crate::errors::Result;
use sea_orm::ConnectionTrait;
use tracing::info;

fn statements(dimension: usize) -> Vec<String> {
    vec![
        "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                id BIGSERIAL PRIMARY KEY,
                text TEXT NOT NULL,
                vector vector({dimension}) NOT NULL,
                content_hash TEXT NOT NULL UNIQUE,
                source_document TEXT,
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ),
        r#"
        CREATE TABLE IF NOT EXISTS conversation_turns (
            id BIGSERIAL PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            query TEXT NOT NULL,
            response TEXT NOT NULL,
            context_chunks JSONB NOT NULL DEFAULT '[]'::jsonb,
            similarity_scores JSONB,
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#
        .to_string(),
        "CREATE INDEX IF NOT EXISTS conversation_turns_conversation_idx \
         ON conversation_turns (conversation_id, id)"
            .to_string(),
    ]
}

/// Create the pgvector extension and tables if they are missing
pub async fn ensure_schema(pool: &DbPool, dimension: usize) -> Result<()> {
    for stmt in statements(dimension) {
        pool.conn().execute_unprepared(&stmt).await?;
    }

    info!(dimension, "Database schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_column_uses_dimension() {
        let stmts = statements(384);
        assert!(stmts[1].contains("vector(384)"));
        assert!(stmts[1].contains("content_hash TEXT NOT NULL UNIQUE"));
        assert!(stmts[1].contains("'{}'::jsonb"));
    }
}
