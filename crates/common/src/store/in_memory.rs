//! Process-local embedding store
//!
//! Used for tests and the `memory` storage backend. Dedup happens under the
//! write lock, so concurrent upserts of the same text insert once.

use super::{
    check_query, content_hash, cosine_similarity, rank, validate_new, EmbeddingRecord,
    EmbeddingStore, NewEmbedding, ScoredRecord, Upserted,
};
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    next_id: i64,
    records: Vec<EmbeddingRecord>,
    by_hash: HashMap<String, usize>,
}

/// In-memory [`EmbeddingStore`]
pub struct InMemoryEmbeddingStore {
    dimension: usize,
    inner: RwLock<Inner>,
}

impl InMemoryEmbeddingStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::new(Inner::default()),
        }
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryEmbeddingStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<EmbeddingRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_hash
            .get(content_hash)
            .map(|&idx| inner.records[idx].clone()))
    }

    async fn upsert(&self, new: NewEmbedding) -> Result<Upserted> {
        let normalized = validate_new(&new, self.dimension)?;
        let hash = content_hash(&normalized);

        let mut inner = self.inner.write().await;
        if let Some(&idx) = inner.by_hash.get(&hash) {
            return Ok(Upserted {
                record: inner.records[idx].clone(),
                inserted: false,
            });
        }

        inner.next_id += 1;
        let record = EmbeddingRecord {
            id: inner.next_id,
            text: new.text,
            vector: new.vector,
            content_hash: hash.clone(),
            source_document: new.source_document,
            metadata: new.metadata,
        };

        let idx = inner.records.len();
        inner.records.push(record.clone());
        inner.by_hash.insert(hash, idx);

        Ok(Upserted {
            record,
            inserted: true,
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

        let inner = self.inner.read().await;
        let candidates = inner.records.iter().map(|record| ScoredRecord {
            similarity: cosine_similarity(query, &record.vector),
            record: record.clone(),
        });

        Ok(rank(candidates, top_k, min_similarity))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.inner.read().await.records.len() as u64)
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let removed = inner.records.len() as u64;
        inner.records.clear();
        inner.by_hash.clear();
        Ok(removed)
    }
}
