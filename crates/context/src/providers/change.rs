//! ServiceNow provider: change management context

use crate::provider::{
    build_system_prompt, history_text, ContextChunk, ContextPayload, ContextProvider,
    HandledQuery, ProviderDescriptor, Selector, SourceLink,
};
use crate::services::ChangeSource;
use async_trait::async_trait;
use netrag_common::{AppError, ConversationMemory, Metadata, Result};
use regex_lite::Regex;
use serde_json::json;
use std::sync::Arc;

const KEYWORDS: &[&str] = &[
    "change",
    "change request",
    "servicenow",
    "change management",
    "change control",
    "change ticket",
    "change window",
    "change schedule",
    "change approval",
    "change risk",
];

/// System prompt used when the user asks for a new change request
pub const CHANGE_EXTRACTION_PROMPT: &str = "You are a ServiceNow change management expert. \
Extract and infer all necessary details from the query to create a well-structured change request.

Required fields to populate:
- number: Generate a unique CHG number (format: CHGTEST{####})
- short_description: Brief, clear summary of the change
- description: Detailed explanation including purpose, technical details, implementation steps and rollback plan
- state: Usually 'new' for creation
- priority: [low, medium, high] based on business impact
- risk: [low, medium, high] based on technical complexity
- impact: [low, medium, high] based on user/service effect
- assigned_to: Default to 'Change Manager' if not specified
- requested_by: Extract from query or default to 'System'
- start_date: Infer reasonable date/time or default to next business day
- end_date: Based on complexity, usually start_date + 4 hours

Format the response as:
'I've created the change request {number} for {short_description}'

Include all extracted and inferred fields in a structured format below the confirmation message.";

pub struct ChangeProvider {
    source: Arc<dyn ChangeSource>,
    selector: Selector,
    descriptor: ProviderDescriptor,
    creation_intent: Regex,
}

impl ChangeProvider {
    pub fn new(source: Arc<dyn ChangeSource>) -> Result<Self> {
        Self::with_selector(source, Selector::keywords(KEYWORDS))
    }

    pub fn with_selector(source: Arc<dyn ChangeSource>, selector: Selector) -> Result<Self> {
        let creation_intent =
            Regex::new(r"(?i)\b(create|raise|new)\b").map_err(|e| AppError::Internal {
                message: format!("Invalid creation-intent pattern: {}", e),
            })?;

        Ok(Self {
            source,
            selector,
            descriptor: ProviderDescriptor::new(
                "ServiceNow Provider",
                "Handles queries about change management and change requests",
                &[
                    "Change request status",
                    "Change request details",
                    "Change scheduling",
                    "Change risk assessment",
                    "Change approval status",
                ],
                &[
                    "Read-only access to changes",
                    "Limited to change request scope",
                    "No change creation/modification",
                ],
            ),
            creation_intent,
        })
    }

    /// Whether the query asks for a new change request
    pub fn is_creation_request(&self, query: &str) -> bool {
        self.creation_intent.is_match(query)
    }
}

#[async_trait]
impl ContextProvider for ChangeProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn can_handle(&self, query: &str) -> bool {
        self.selector.matches(query)
    }

    async fn get_context(&self, query: &str) -> Result<ContextPayload> {
        let changes = self.source.changes(query).await;

        let chunks = changes
            .result
            .iter()
            .map(|change| ContextChunk::plain(change.to_context()))
            .collect();

        let source_links = changes
            .result
            .iter()
            .map(|change| {
                let mut metadata = Metadata::new();
                metadata.insert("change_number".into(), json!(change.number));
                metadata.insert("state".into(), json!(change.state));
                metadata.insert("priority".into(), json!(change.priority));
                metadata.insert("risk".into(), json!(change.risk));
                metadata.insert("impact".into(), json!(change.impact));

                SourceLink {
                    provider: "ServiceNow".to_string(),
                    link: Some(format!("/change_request/{}", change.sys_id)),
                    metadata,
                }
            })
            .collect();

        let summary = format!(
            "Found {} change requests matching the query.",
            changes.result.len()
        );

        Ok(ContextPayload::new(chunks, source_links)
            .with_summary(summary)
            .with_data(json!({ "changes": changes.result })))
    }

    async fn handle_query(
        &self,
        query: &str,
        memory: Option<&ConversationMemory>,
        conversation_id: Option<&str>,
    ) -> Result<HandledQuery> {
        let context = self.get_context(query).await?;
        let history_text = history_text(memory, conversation_id).await?;

        let system_prompt = if self.is_creation_request(query) {
            format!(
                "{}\n\nPrevious conversation:\n{}",
                CHANGE_EXTRACTION_PROMPT, history_text
            )
        } else {
            build_system_prompt(&self.descriptor, &history_text, context.fallback)
        };

        Ok(HandledQuery {
            context,
            system_prompt,
            history_text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ChangeList;

    struct SampleSource;

    #[async_trait]
    impl ChangeSource for SampleSource {
        async fn changes(&self, _query: &str) -> ChangeList {
            ChangeList::sample()
        }
    }

    fn provider() -> ChangeProvider {
        ChangeProvider::new(Arc::new(SampleSource)).unwrap()
    }

    #[test]
    fn test_creation_intent_is_whole_word() {
        let provider = provider();
        assert!(provider.is_creation_request("Create a change request for the switch upgrade"));
        assert!(provider.is_creation_request("please RAISE a change"));
        assert!(provider.is_creation_request("new change for tonight"));
        assert!(!provider.is_creation_request("what changes were renewed"));
        assert!(!provider.is_creation_request("show recreated changes"));
    }

    #[tokio::test]
    async fn test_context_and_links() {
        let payload = provider().get_context("open changes").await.unwrap();

        assert_eq!(payload.chunks.len(), 1);
        assert_eq!(
            payload.summary.as_deref(),
            Some("Found 1 change requests matching the query.")
        );
        assert_eq!(payload.source_links[0].link.as_deref(), Some("/change_request/CHG001"));
        assert_eq!(payload.source_links[0].metadata["change_number"], "CHG0000001");
        assert_eq!(payload.texts().len(), 2);
    }

    #[tokio::test]
    async fn test_prompt_depends_on_intent() {
        let provider = provider();

        let create = provider
            .handle_query("create a change for the core switch", None, None)
            .await
            .unwrap();
        assert!(create.system_prompt.starts_with(CHANGE_EXTRACTION_PROMPT));

        let status = provider
            .handle_query("what is the change risk for CHG0000001", None, None)
            .await
            .unwrap();
        assert!(status
            .system_prompt
            .starts_with("You are a specialized assistant for ServiceNow Provider."));
    }
}
