//! Query orchestration
//!
//! One query end to end: resolve the conversation, select a provider, gather
//! context and history, generate, then record the turn. A turn is only
//! written after generation succeeds.

use crate::provider::{ContextProvider, ProviderDescriptor, SourceLink};
use crate::router::ProviderRegistry;
use netrag_common::config::LlmConfig;
use netrag_common::llm::GenerationRequest;
use netrag_common::memory::NewTurn;
use netrag_common::{AppError, ConversationMemory, Generator, Metadata, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Structured answer for one query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub context_chunks: Vec<String>,
    pub conversation_id: String,
    pub provider: String,
    pub source_links: Vec<SourceLink>,
    /// True when the answer came from general knowledge
    pub fallback: bool,
}

pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    memory: ConversationMemory,
    generator: Arc<dyn Generator>,
    temperature: f32,
    max_tokens: u32,
}

impl Orchestrator {
    /// Fails when no provider is registered
    pub fn new(
        registry: ProviderRegistry,
        memory: ConversationMemory,
        generator: Arc<dyn Generator>,
        llm: &LlmConfig,
    ) -> Result<Self> {
        if registry.is_empty() {
            return Err(AppError::Configuration {
                message: "at least one context provider must be registered".to_string(),
            });
        }
        if !registry.has_fallback() {
            warn!("No fallback provider registered; unmatched queries will fail");
        }

        Ok(Self {
            registry: Arc::new(registry),
            memory,
            generator,
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
        })
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn capabilities(&self) -> Vec<ProviderDescriptor> {
        self.registry.capabilities()
    }

    /// Generation backend health
    pub async fn health(&self) -> bool {
        self.generator.health_check().await
    }

    #[instrument(skip_all, fields(conversation_id = tracing::field::Empty))]
    pub async fn answer(&self, query: &str, conversation_id: Option<&str>) -> Result<QueryAnswer> {
        let start = Instant::now();

        if query.trim().is_empty() {
            return Err(AppError::validation("query", "query must not be empty"));
        }

        let conversation_id = match conversation_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => self.memory.start_conversation(),
        };
        tracing::Span::current().record("conversation_id", conversation_id.as_str());

        let selection = self.registry.select(query)?;
        let provider = selection.provider;
        let provider_name = provider.name().to_string();
        netrag_common::metrics::record_route(&provider_name, selection.via_fallback);

        let result = self
            .run(query, &conversation_id, provider.as_ref(), &provider_name)
            .await;

        let fallback = result.as_ref().map(|a| a.fallback).unwrap_or(selection.via_fallback);
        netrag_common::metrics::record_query(
            &provider_name,
            fallback,
            result.is_ok(),
            start.elapsed(),
        );

        result
    }

    async fn run(
        &self,
        query: &str,
        conversation_id: &str,
        provider: &dyn ContextProvider,
        provider_name: &str,
    ) -> Result<QueryAnswer> {
        let handled = provider
            .handle_query(query, Some(&self.memory), Some(conversation_id))
            .await
            .map_err(|e| AppError::ProviderFailed {
                provider: provider_name.to_string(),
                source: Box::new(e),
            })?;

        let context_chunks = handled.context.texts();
        let request = GenerationRequest::new(query, &context_chunks)
            .with_system_prompt(Some(handled.system_prompt.as_str()))
            .with_sampling(self.temperature, self.max_tokens);

        let answer = self.generator.generate(&request).await?;

        let mut metadata = Metadata::new();
        metadata.insert("provider".into(), json!(provider_name));
        metadata.insert("fallback".into(), json!(handled.context.fallback));
        metadata.insert("source_count".into(), json!(handled.context.source_links.len()));

        self.memory
            .record_turn(
                NewTurn::new(conversation_id, query, answer.as_str())
                    .with_context(context_chunks.clone(), handled.context.similarity_scores())
                    .with_metadata(metadata),
            )
            .await?;

        info!(
            provider = provider_name,
            context_chunks = context_chunks.len(),
            fallback = handled.context.fallback,
            "Query answered"
        );

        Ok(QueryAnswer {
            answer,
            context_chunks,
            conversation_id: conversation_id.to_string(),
            provider: provider_name.to_string(),
            source_links: handled.context.source_links,
            fallback: handled.context.fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ContextChunk, ContextPayload, Selector};
    use crate::providers::KnowledgeProvider;
    use async_trait::async_trait;
    use netrag_common::config::RetrievalConfig;
    use netrag_common::embeddings::MockEmbedder;
    use netrag_common::llm::MockGenerator;
    use netrag_common::memory::InMemoryTurnStore;
    use netrag_common::store::InMemoryEmbeddingStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Network {
        descriptor: ProviderDescriptor,
    }

    #[async_trait]
    impl ContextProvider for Network {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        fn can_handle(&self, query: &str) -> bool {
            Selector::keywords(&["vlan", "device"]).matches(query)
        }

        async fn get_context(&self, _query: &str) -> Result<ContextPayload> {
            Ok(ContextPayload::new(
                vec![ContextChunk::plain("Organization: Big Data Org\nVLAN 100 is Data")],
                vec![SourceLink {
                    provider: "SDWAN".into(),
                    link: Some("/network/devices/DC-EDGE-01".into()),
                    metadata: Metadata::new(),
                }],
            ))
        }
    }

    /// Fails while `failing` is set
    #[derive(Default)]
    struct Flaky {
        failing: AtomicBool,
    }

    #[async_trait]
    impl Generator for Flaky {
        async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::GenerationError {
                    message: "backend unavailable".into(),
                });
            }
            Ok(format!("answer to {}", request.query))
        }

        async fn health_check(&self) -> bool {
            !self.failing.load(Ordering::SeqCst)
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    fn memory() -> ConversationMemory {
        ConversationMemory::new(Arc::new(InMemoryTurnStore::new()), 5)
    }

    fn registry() -> ProviderRegistry {
        let store = Arc::new(InMemoryEmbeddingStore::new(32));
        let embedder = Arc::new(MockEmbedder::new(32));

        let mut registry = ProviderRegistry::new();
        registry.register(
            Arc::new(Network {
                descriptor: ProviderDescriptor::new(
                    "SD-WAN Provider",
                    "network",
                    &["VLAN configuration"],
                    &[],
                ),
            }),
            false,
        );
        registry.register(
            Arc::new(
                KnowledgeProvider::new(store, embedder, &RetrievalConfig::default())
                    .always_available(),
            ),
            true,
        );
        registry
    }

    fn orchestrator(generator: Arc<dyn Generator>) -> Orchestrator {
        Orchestrator::new(registry(), memory(), generator, &LlmConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_answer_records_turn_with_context() {
        let orchestrator = orchestrator(Arc::new(MockGenerator::new()));

        let answer = orchestrator.answer("show me VLAN 100", None).await.unwrap();

        assert_eq!(answer.provider, "SD-WAN Provider");
        assert!(!answer.fallback);
        assert!(answer.answer.contains("network configuration"));
        assert_eq!(answer.source_links.len(), 1);
        assert!(!answer.conversation_id.is_empty());

        let turns = orchestrator
            .memory()
            .recent_history(&answer.conversation_id, 5)
            .await
            .unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].context_chunks, answer.context_chunks);
        assert_eq!(turns[0].metadata["provider"], "SD-WAN Provider");
        assert_eq!(turns[0].metadata["source_count"], 1);
    }

    #[tokio::test]
    async fn test_unmatched_query_uses_general_knowledge_fallback() {
        let orchestrator = orchestrator(Arc::new(MockGenerator::new()));

        let answer = orchestrator
            .answer("summarize the onboarding doc", Some("conv-1"))
            .await
            .unwrap();

        assert_eq!(answer.provider, "Knowledge Base Provider");
        assert!(answer.fallback);
        assert_eq!(answer.conversation_id, "conv-1");
        assert!(answer.source_links.is_empty());
    }

    #[tokio::test]
    async fn test_conversation_continues_across_queries() {
        let orchestrator = orchestrator(Arc::new(MockGenerator::new()));

        let first = orchestrator.answer("show me VLAN 100", None).await.unwrap();
        orchestrator
            .answer("and the device status?", Some(&first.conversation_id))
            .await
            .unwrap();

        let history = orchestrator.memory().history(&first.conversation_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].query, "show me VLAN 100");
    }

    #[tokio::test]
    async fn test_generation_failure_leaves_history_unchanged() {
        let generator = Arc::new(Flaky::default());
        let orchestrator = orchestrator(generator.clone());

        orchestrator.answer("show me VLAN 100", Some("conv")).await.unwrap();

        generator.failing.store(true, Ordering::SeqCst);
        let err = orchestrator
            .answer("show me VLAN 200", Some("conv"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::GenerationError { .. }));
        assert!(!orchestrator.health().await);

        let turns = orchestrator.memory().recent_history("conv", 5).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].query, "show me VLAN 100");
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected_before_any_write() {
        let orchestrator = orchestrator(Arc::new(MockGenerator::new()));

        let err = orchestrator.answer("   ", Some("conv")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(orchestrator.memory().count_turns().await.unwrap(), 0);
    }

    #[test]
    fn test_empty_registry_is_a_configuration_error() {
        let result = Orchestrator::new(
            ProviderRegistry::new(),
            memory(),
            Arc::new(MockGenerator::new()),
            &LlmConfig::default(),
        );
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }

    /// Embedding backend that is always down
    struct Unreachable;

    #[async_trait]
    impl netrag_common::Embedder for Unreachable {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AppError::EmbeddingError {
                message: "connection refused".into(),
            })
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(AppError::EmbeddingError {
                message: "connection refused".into(),
            })
        }

        fn model_name(&self) -> &str {
            "unreachable"
        }

        fn dimension(&self) -> usize {
            32
        }
    }

    #[tokio::test]
    async fn test_provider_failure_is_wrapped_and_writes_no_turn() {
        let mut registry = ProviderRegistry::new();
        registry.register(
            Arc::new(
                KnowledgeProvider::new(
                    Arc::new(InMemoryEmbeddingStore::new(32)),
                    Arc::new(Unreachable),
                    &RetrievalConfig::default(),
                )
                .always_available(),
            ),
            true,
        );
        let orchestrator = Orchestrator::new(
            registry,
            memory(),
            Arc::new(MockGenerator::new()),
            &LlmConfig::default(),
        )
        .unwrap();

        let err = orchestrator
            .answer("summarize the onboarding doc", Some("conv"))
            .await
            .unwrap_err();

        match &err {
            AppError::ProviderFailed { provider, source } => {
                assert_eq!(provider, "Knowledge Base Provider");
                assert!(matches!(**source, AppError::EmbeddingError { .. }));
            }
            other => panic!("expected ProviderFailed, got {other:?}"),
        }
        assert!(err.is_upstream());
        assert_eq!(orchestrator.memory().count_turns().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unmatched_query_without_fallback_is_no_provider() {
        let mut registry = ProviderRegistry::new();
        registry.register(
            Arc::new(Network {
                descriptor: ProviderDescriptor::new("SD-WAN Provider", "network", &[], &[]),
            }),
            false,
        );
        let orchestrator = Orchestrator::new(
            registry,
            memory(),
            Arc::new(MockGenerator::new()),
            &LlmConfig::default(),
        )
        .unwrap();

        let err = orchestrator
            .answer("summarize the onboarding doc", Some("conv"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NoProvider { .. }));
        assert!(!err.is_upstream());
        assert_eq!(orchestrator.memory().count_turns().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_capabilities_pass_through() {
        let orchestrator = orchestrator(Arc::new(MockGenerator::new()));
        let names: Vec<String> = orchestrator.capabilities().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["SD-WAN Provider", "Knowledge Base Provider"]);
    }
}
