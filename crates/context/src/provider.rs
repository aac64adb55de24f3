//! Context provider capability interface
//!
//! A provider decides whether it can answer a query, assembles a context
//! payload for it, and describes itself for prompts and introspection.

use async_trait::async_trait;
use netrag_common::{ConversationMemory, Metadata, Result};
use serde::{Deserialize, Serialize};

/// Instruction appended to the system prompt when no matching context exists
pub const GENERAL_KNOWLEDGE_INSTRUCTION: &str = "No matching document was found in the knowledge \
base for this query. Answer from general knowledge and state clearly that no matching document \
was found.";

/// Name, purpose and boundaries of a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub limitations: Vec<String>,
}

impl ProviderDescriptor {
    pub fn new(
        name: &str,
        description: &str,
        capabilities: &[&str],
        limitations: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            limitations: limitations.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Attribution for a piece of context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLink {
    pub provider: String,
    pub link: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One context string, scored when it came from similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub text: String,
    pub similarity: Option<f32>,
}

impl ContextChunk {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            similarity: None,
        }
    }

    pub fn scored(text: impl Into<String>, similarity: f32) -> Self {
        Self {
            text: text.into(),
            similarity: Some(similarity),
        }
    }
}

/// Everything a provider gathered for one query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextPayload {
    pub chunks: Vec<ContextChunk>,
    pub source_links: Vec<SourceLink>,
    /// One-line digest appended after the chunks
    pub summary: Option<String>,
    /// Set when nothing relevant was found and the answer must come from
    /// general knowledge
    pub fallback: bool,
    /// Raw structured data behind the chunks
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ContextPayload {
    pub fn new(chunks: Vec<ContextChunk>, source_links: Vec<SourceLink>) -> Self {
        Self {
            chunks,
            source_links,
            ..Default::default()
        }
    }

    /// Explicit "no relevant context" result
    pub fn no_relevant_context() -> Self {
        Self {
            summary: Some("No relevant documents found in the knowledge base.".to_string()),
            fallback: true,
            ..Default::default()
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Context strings handed to the generator, in order
    pub fn texts(&self) -> Vec<String> {
        self.chunks
            .iter()
            .map(|c| c.text.clone())
            .chain(self.summary.iter().cloned())
            .collect()
    }

    /// Scores parallel to [`texts`](Self::texts), only when every entry has one
    pub fn similarity_scores(&self) -> Option<Vec<f32>> {
        if self.chunks.is_empty() || self.summary.is_some() {
            return None;
        }
        self.chunks.iter().map(|c| c.similarity).collect()
    }
}

/// How a provider decides whether a query is in its domain
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Case-insensitive substring match on any keyword
    Keywords(Vec<String>),
    /// Matches every query; used for fallback providers
    Always,
}

impl Selector {
    pub fn keywords(keywords: &[&str]) -> Self {
        Selector::Keywords(keywords.iter().map(|k| k.to_lowercase()).collect())
    }

    pub fn matches(&self, query: &str) -> bool {
        match self {
            Selector::Always => true,
            Selector::Keywords(keywords) => {
                let query = query.to_lowercase();
                keywords.iter().any(|k| query.contains(k.as_str()))
            }
        }
    }
}

/// Output of [`ContextProvider::handle_query`]
#[derive(Debug, Clone)]
pub struct HandledQuery {
    pub context: ContextPayload,
    pub system_prompt: String,
    pub history_text: String,
}

/// Pluggable, capability-scoped context source
#[async_trait]
pub trait ContextProvider: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn describe(&self) -> ProviderDescriptor {
        self.descriptor().clone()
    }

    /// Fast, side-effect-free domain check
    fn can_handle(&self, query: &str) -> bool;

    async fn get_context(&self, query: &str) -> Result<ContextPayload>;

    /// Fetch context and history, then build the system prompt
    async fn handle_query(
        &self,
        query: &str,
        memory: Option<&ConversationMemory>,
        conversation_id: Option<&str>,
    ) -> Result<HandledQuery> {
        let context = self.get_context(query).await?;
        let history_text = history_text(memory, conversation_id).await?;
        let system_prompt = build_system_prompt(self.descriptor(), &history_text, context.fallback);

        Ok(HandledQuery {
            context,
            system_prompt,
            history_text,
        })
    }
}

/// Recent history rendered for a prompt; empty without memory or id
pub async fn history_text(
    memory: Option<&ConversationMemory>,
    conversation_id: Option<&str>,
) -> Result<String> {
    match (memory, conversation_id) {
        (Some(memory), Some(id)) => {
            let turns = memory.recent_history(id, memory.window()).await?;
            Ok(ConversationMemory::format_for_prompt(&turns))
        }
        _ => Ok(String::new()),
    }
}

/// Default system prompt naming the provider and its boundaries
pub fn build_system_prompt(
    descriptor: &ProviderDescriptor,
    history_text: &str,
    fallback: bool,
) -> String {
    let mut prompt = format!(
        "You are a specialized assistant for {}.\n\
         Analyze the provided context to answer questions about {}.\n\
         Be specific and reference actual configuration details.\n\n\
         Provider Limitations:\n{}\n\n\
         Previous conversation:\n{}",
        descriptor.name,
        descriptor.capabilities.join(", "),
        descriptor.limitations.join(", "),
        history_text
    );

    if fallback {
        prompt.push_str("\n\n");
        prompt.push_str(GENERAL_KNOWLEDGE_INSTRUCTION);
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use netrag_common::memory::{InMemoryTurnStore, NewTurn};
    use std::sync::Arc;

    struct Static {
        descriptor: ProviderDescriptor,
        payload: ContextPayload,
    }

    #[async_trait]
    impl ContextProvider for Static {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        fn can_handle(&self, _query: &str) -> bool {
            true
        }

        async fn get_context(&self, _query: &str) -> Result<ContextPayload> {
            Ok(self.payload.clone())
        }
    }

    fn descriptor() -> ProviderDescriptor {
        ProviderDescriptor::new(
            "Test Provider",
            "Answers test questions",
            &["Test lookup", "Test status"],
            &["Read-only access"],
        )
    }

    #[test]
    fn test_keyword_selector_is_case_insensitive() {
        let selector = Selector::keywords(&["vlan", "Device"]);
        assert!(selector.matches("show me VLAN 100"));
        assert!(selector.matches("which devices are down"));
        assert!(!selector.matches("summarize the onboarding doc"));
        assert!(Selector::Always.matches(""));
    }

    #[test]
    fn test_payload_texts_and_scores() {
        let payload = ContextPayload::new(
            vec![ContextChunk::scored("a", 0.9), ContextChunk::scored("b", 0.85)],
            vec![],
        );
        assert_eq!(payload.texts(), vec!["a", "b"]);
        assert_eq!(payload.similarity_scores(), Some(vec![0.9, 0.85]));

        let mixed = ContextPayload::new(
            vec![ContextChunk::scored("a", 0.9), ContextChunk::plain("b")],
            vec![],
        );
        assert_eq!(mixed.similarity_scores(), None);

        let empty = ContextPayload::no_relevant_context();
        assert!(empty.fallback);
        assert_eq!(empty.texts().len(), 1);
        assert_eq!(empty.similarity_scores(), None);
    }

    #[test]
    fn test_system_prompt_mentions_descriptor() {
        let prompt = build_system_prompt(&descriptor(), "User: hi\nAssistant: hello\n---", false);

        assert!(prompt.starts_with("You are a specialized assistant for Test Provider."));
        assert!(prompt.contains("Test lookup, Test status"));
        assert!(prompt.contains("Provider Limitations:\nRead-only access"));
        assert!(prompt.ends_with("User: hi\nAssistant: hello\n---"));
        assert!(!prompt.contains(GENERAL_KNOWLEDGE_INSTRUCTION));
    }

    #[tokio::test]
    async fn test_default_handle_query_adds_history_and_fallback_note() {
        let memory = ConversationMemory::new(Arc::new(InMemoryTurnStore::new()), 5);
        memory
            .record_turn(NewTurn::new("conv", "earlier question", "earlier answer"))
            .await
            .unwrap();

        let provider = Static {
            descriptor: descriptor(),
            payload: ContextPayload::no_relevant_context(),
        };

        let handled = provider
            .handle_query("anything", Some(&memory), Some("conv"))
            .await
            .unwrap();

        assert_eq!(handled.history_text, "User: earlier question\nAssistant: earlier answer\n---");
        assert!(handled.system_prompt.contains("earlier question"));
        assert!(handled.system_prompt.ends_with(GENERAL_KNOWLEDGE_INSTRUCTION));

        let without_memory = provider.handle_query("anything", None, None).await.unwrap();
        assert!(without_memory.history_text.is_empty());
    }
}
