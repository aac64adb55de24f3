//! Document indexing
//!
//! Splits text into overlapping chunks and stores each one once. The content
//! hash is checked before embedding, so already-stored chunks never reach the
//! embedding backend.

use netrag_common::config::RetrievalConfig;
use netrag_common::store::{content_hash, normalize_text, NewEmbedding};
use netrag_common::{AppError, Embedder, EmbeddingRecord, EmbeddingStore, Metadata, Result};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::{debug, info};

/// Result of indexing one chunk
#[derive(Debug, Clone)]
pub enum IndexOutcome {
    Inserted(EmbeddingRecord),
    Existing(EmbeddingRecord),
}

impl IndexOutcome {
    pub fn record(&self) -> &EmbeddingRecord {
        match self {
            IndexOutcome::Inserted(record) | IndexOutcome::Existing(record) => record,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, IndexOutcome::Inserted(_))
    }
}

/// Summary of a document ingestion
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub chunks: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub record_ids: Vec<i64>,
}

pub struct Indexer {
    store: Arc<dyn EmbeddingStore>,
    embedder: Arc<dyn Embedder>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn EmbeddingStore>,
        embedder: Arc<dyn Embedder>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            chunk_size: retrieval.chunk_size,
            chunk_overlap: retrieval.chunk_overlap,
        }
    }

    /// Store one chunk, embedding it only if its content is new
    pub async fn index_chunk(
        &self,
        text: &str,
        source_document: Option<String>,
        metadata: Metadata,
    ) -> Result<IndexOutcome> {
        if normalize_text(text).is_empty() {
            return Err(AppError::validation("text", "chunk text must not be empty"));
        }

        if let Some(existing) = self.store.find_by_hash(&content_hash(text)).await? {
            debug!(id = existing.id, "Chunk already indexed, skipping embedding");
            netrag_common::metrics::record_dedup(false);
            return Ok(IndexOutcome::Existing(existing));
        }

        let vector = self.embedder.embed(text).await?;
        let upserted = self
            .store
            .upsert(
                NewEmbedding::new(text, vector)
                    .with_source(source_document)
                    .with_metadata(metadata),
            )
            .await?;

        // A concurrent call may have stored the same chunk after our lookup
        netrag_common::metrics::record_dedup(upserted.inserted);
        if upserted.inserted {
            Ok(IndexOutcome::Inserted(upserted.record))
        } else {
            debug!(id = upserted.record.id, "Chunk stored concurrently, reusing record");
            Ok(IndexOutcome::Existing(upserted.record))
        }
    }

    /// Chunk a document and index every chunk
    pub async fn index_document(
        &self,
        text: &str,
        source_document: Option<String>,
        metadata: Metadata,
    ) -> Result<IndexReport> {
        let start = Instant::now();

        let config = ChunkConfig::new(self.chunk_size)
            .with_overlap(self.chunk_overlap)
            .map_err(|e| AppError::Configuration {
                message: format!("Invalid chunking configuration: {}", e),
            })?;
        let splitter = TextSplitter::new(config);

        let chunks: Vec<&str> = splitter
            .chunks(text)
            .filter(|c| !c.trim().is_empty())
            .collect();

        if chunks.is_empty() {
            return Err(AppError::validation("text", "document contains no text"));
        }

        let mut report = IndexReport {
            chunks: chunks.len(),
            ..Default::default()
        };

        for (index, chunk) in chunks.into_iter().enumerate() {
            let mut chunk_metadata = metadata.clone();
            chunk_metadata.insert("chunk_index".into(), json!(index));

            let outcome = self
                .index_chunk(chunk, source_document.clone(), chunk_metadata)
                .await?;

            if outcome.is_new() {
                report.inserted += 1;
            } else {
                report.duplicates += 1;
            }
            report.record_ids.push(outcome.record().id);
        }

        netrag_common::metrics::record_ingestion(start.elapsed());
        info!(
            source = source_document.as_deref().unwrap_or("-"),
            chunks = report.chunks,
            inserted = report.inserted,
            duplicates = report.duplicates,
            "Document indexed"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use netrag_common::embeddings::MockEmbedder;
    use netrag_common::store::InMemoryEmbeddingStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls to the wrapped embedder
    struct Counting {
        inner: MockEmbedder,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for Counting {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed_batch(texts).await
        }

        fn model_name(&self) -> &str {
            "counting"
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    fn setup(chunk_size: usize, chunk_overlap: usize) -> (Indexer, Arc<Counting>) {
        let embedder = Arc::new(Counting {
            inner: MockEmbedder::new(32),
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(InMemoryEmbeddingStore::new(32));
        let retrieval = RetrievalConfig {
            chunk_size,
            chunk_overlap,
            ..RetrievalConfig::default()
        };
        (Indexer::new(store, embedder.clone(), &retrieval), embedder)
    }

    #[tokio::test]
    async fn test_duplicate_chunk_embeds_once() {
        let (indexer, embedder) = setup(2000, 200);

        let first = indexer
            .index_chunk("VLAN 100 is Data", None, Metadata::new())
            .await
            .unwrap();
        let second = indexer
            .index_chunk("VLAN  100 is Data", None, Metadata::new())
            .await
            .unwrap();

        assert!(first.is_new());
        assert!(!second.is_new());
        assert_eq!(first.record().id, second.record().id);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reingesting_a_document_adds_nothing() {
        let (indexer, embedder) = setup(40, 10);
        let document = "VLAN 100 carries data traffic. VLAN 200 carries voice traffic. \
                        Branch devices mirror the data center layout.";

        let first = indexer
            .index_document(document, Some("design.txt".into()), Metadata::new())
            .await
            .unwrap();
        assert!(first.chunks > 1);
        assert_eq!(first.inserted + first.duplicates, first.chunks);

        let calls_after_first = embedder.calls.load(Ordering::SeqCst);
        let second = indexer
            .index_document(document, Some("design.txt".into()), Metadata::new())
            .await
            .unwrap();

        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, second.chunks);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_first);
    }

    /// Holds every embed call long enough for concurrent lookups to miss
    struct Slow {
        inner: MockEmbedder,
    }

    #[async_trait]
    impl Embedder for Slow {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.inner.embed_batch(texts).await
        }

        fn model_name(&self) -> &str {
            "slow"
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    #[tokio::test]
    async fn test_concurrent_indexing_reports_one_insert() {
        let store = Arc::new(InMemoryEmbeddingStore::new(32));
        let embedder = Arc::new(Slow {
            inner: MockEmbedder::new(32),
        });
        let indexer = Indexer::new(store.clone(), embedder, &RetrievalConfig::default());

        let (a, b) = tokio::join!(
            indexer.index_chunk("VLAN 100 is Data", None, Metadata::new()),
            indexer.index_chunk("VLAN 100 is Data", None, Metadata::new()),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.record().id, b.record().id);
        assert_eq!([a.is_new(), b.is_new()].iter().filter(|new| **new).count(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejects_empty_input() {
        let (indexer, _) = setup(2000, 200);

        assert!(indexer.index_chunk("  ", None, Metadata::new()).await.is_err());
        assert!(indexer.index_document("\n\n", None, Metadata::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_overlap_larger_than_chunk_is_configuration_error() {
        let (indexer, _) = setup(10, 20);
        let err = indexer
            .index_document("some text", None, Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }
}
