//! Knowledge-base provider: similarity search over indexed documents

use crate::provider::{
    ContextChunk, ContextPayload, ContextProvider, ProviderDescriptor, Selector, SourceLink,
};
use async_trait::async_trait;
use netrag_common::config::RetrievalConfig;
use netrag_common::{Embedder, EmbeddingStore, Metadata, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const KEYWORDS: &[&str] = &[
    "document",
    "knowledge",
    "search",
    "find",
    "look up",
    "information",
    "content",
    "text",
    "file",
    "pdf",
];

/// Source name used in attribution links
pub const KNOWLEDGE_SOURCE: &str = "Knowledge Base";

pub struct KnowledgeProvider {
    store: Arc<dyn EmbeddingStore>,
    embedder: Arc<dyn Embedder>,
    selector: Selector,
    descriptor: ProviderDescriptor,
    top_k: usize,
    min_similarity: f32,
}

impl KnowledgeProvider {
    pub fn new(
        store: Arc<dyn EmbeddingStore>,
        embedder: Arc<dyn Embedder>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        let threshold = format!("Similarity threshold > {}", retrieval.min_similarity);
        let max_results = format!("Maximum {} results per query", retrieval.top_k);

        Self {
            store,
            embedder,
            selector: Selector::keywords(KEYWORDS),
            descriptor: ProviderDescriptor::new(
                "Knowledge Base Provider",
                "Handles queries about documents and knowledge base content",
                &[
                    "Document search",
                    "Content retrieval",
                    "Similarity-based search",
                    "Metadata filtering",
                    "Source tracking",
                ],
                &[
                    "Requires pre-indexed documents",
                    "Limited to text content",
                    threshold.as_str(),
                    max_results.as_str(),
                ],
            ),
            top_k: retrieval.top_k,
            min_similarity: retrieval.min_similarity,
        }
    }

    /// Accept every query, for registration as the fallback
    pub fn always_available(mut self) -> Self {
        self.selector = Selector::Always;
        self
    }
}

#[async_trait]
impl ContextProvider for KnowledgeProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn can_handle(&self, query: &str) -> bool {
        self.selector.matches(query)
    }

    async fn get_context(&self, query: &str) -> Result<ContextPayload> {
        let start = Instant::now();

        let vector = self.embedder.embed(&query.to_lowercase()).await?;
        let hits = self
            .store
            .search(&vector, self.top_k, self.min_similarity)
            .await?;

        netrag_common::metrics::record_retrieval(start.elapsed(), hits.len());
        debug!(hits = hits.len(), min_similarity = self.min_similarity, "Knowledge base searched");

        if hits.is_empty() {
            return Ok(ContextPayload::no_relevant_context());
        }

        let source_links = hits
            .iter()
            .map(|hit| {
                let document_type = hit
                    .record
                    .metadata
                    .get("type")
                    .cloned()
                    .unwrap_or_else(|| json!("unknown"));

                let mut metadata = Metadata::new();
                metadata.insert("similarity".into(), json!(hit.similarity));
                metadata.insert("document_type".into(), document_type);

                SourceLink {
                    provider: KNOWLEDGE_SOURCE.to_string(),
                    link: hit.record.source_document.clone(),
                    metadata,
                }
            })
            .collect();

        let documents: Vec<_> = hits
            .iter()
            .map(|hit| {
                json!({
                    "text": hit.record.text,
                    "source": hit.record.source_document,
                    "similarity": hit.similarity,
                    "metadata": hit.record.metadata,
                })
            })
            .collect();

        let chunks = hits
            .into_iter()
            .map(|hit| ContextChunk::scored(hit.record.text, hit.similarity))
            .collect();

        Ok(ContextPayload::new(chunks, source_links).with_data(json!({
            "query": query,
            "documents": documents,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netrag_common::embeddings::MockEmbedder;
    use netrag_common::store::{InMemoryEmbeddingStore, NewEmbedding};

    async fn provider_with(texts: &[(&str, Option<&str>)]) -> KnowledgeProvider {
        let embedder = Arc::new(MockEmbedder::new(64));
        let store = Arc::new(InMemoryEmbeddingStore::new(64));

        for (text, doc_type) in texts {
            let mut metadata = Metadata::new();
            if let Some(t) = doc_type {
                metadata.insert("type".into(), json!(t));
            }
            let vector = embedder.embed(text).await.unwrap();
            store
                .upsert(
                    NewEmbedding::new(*text, vector)
                        .with_source(Some("runbook.pdf".into()))
                        .with_metadata(metadata),
                )
                .await
                .unwrap();
        }

        KnowledgeProvider::new(store, embedder, &RetrievalConfig::default())
    }

    #[tokio::test]
    async fn test_exact_match_is_returned_with_links() {
        let provider =
            provider_with(&[("VLAN 100 is Data", Some("pdf")), ("quarterly budget", None)]).await;

        let payload = provider.get_context("VLAN 100 is Data").await.unwrap();

        assert!(!payload.fallback);
        assert_eq!(payload.chunks.len(), 1);
        assert_eq!(payload.chunks[0].text, "VLAN 100 is Data");
        assert!(payload.chunks[0].similarity.unwrap() > 0.99);

        let link = &payload.source_links[0];
        assert_eq!(link.provider, KNOWLEDGE_SOURCE);
        assert_eq!(link.link.as_deref(), Some("runbook.pdf"));
        assert_eq!(link.metadata["document_type"], "pdf");
    }

    #[tokio::test]
    async fn test_no_hits_produce_fallback_payload() {
        let provider = provider_with(&[("quarterly budget", None)]).await;

        let payload = provider.get_context("summarize the onboarding doc").await.unwrap();

        assert!(payload.fallback);
        assert!(payload.chunks.is_empty());
        assert!(payload.source_links.is_empty());
    }

    #[tokio::test]
    async fn test_selector_modes() {
        let provider = provider_with(&[]).await;
        assert!(provider.can_handle("find the design document"));
        assert!(!provider.can_handle("hello there"));

        let fallback = provider.always_available();
        assert!(fallback.can_handle("hello there"));
    }
}
