//! Provider registry
//!
//! Ordered first-match selection over candidate providers, with at most one
//! fallback that answers whatever the candidates decline.

use crate::provider::{ContextProvider, ProviderDescriptor};
use netrag_common::{AppError, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of [`ProviderRegistry::select`]
#[derive(Clone)]
pub struct Selection {
    pub provider: Arc<dyn ContextProvider>,
    pub via_fallback: bool,
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    candidates: Vec<Arc<dyn ContextProvider>>,
    fallback: Option<Arc<dyn ContextProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate, or set the fallback. A later fallback replaces an
    /// earlier one.
    pub fn register(&mut self, provider: Arc<dyn ContextProvider>, as_fallback: bool) {
        if as_fallback {
            if let Some(previous) = &self.fallback {
                warn!(
                    previous = previous.name(),
                    replacement = provider.name(),
                    "Replacing fallback provider"
                );
            }
            self.fallback = Some(provider);
        } else {
            self.candidates.push(provider);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty() && self.fallback.is_none()
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// First candidate whose `can_handle` accepts the query, else the fallback
    pub fn select(&self, query: &str) -> Result<Selection> {
        if let Some(provider) = self.candidates.iter().find(|p| p.can_handle(query)) {
            debug!(provider = provider.name(), "Candidate provider selected");
            return Ok(Selection {
                provider: provider.clone(),
                via_fallback: false,
            });
        }

        match &self.fallback {
            Some(provider) => {
                debug!(provider = provider.name(), "Fallback provider selected");
                Ok(Selection {
                    provider: provider.clone(),
                    via_fallback: true,
                })
            }
            None if self.candidates.is_empty() => Err(AppError::NoProvider {
                reason: "no providers registered".to_string(),
            }),
            None => Err(AppError::NoProvider {
                reason: "no provider can handle the query and no fallback is registered"
                    .to_string(),
            }),
        }
    }

    /// Descriptors in selection order: candidates, then the fallback
    pub fn capabilities(&self) -> Vec<ProviderDescriptor> {
        self.candidates
            .iter()
            .chain(self.fallback.iter())
            .map(|p| p.describe())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ContextPayload, Selector};
    use async_trait::async_trait;

    struct Keyword {
        descriptor: ProviderDescriptor,
        selector: Selector,
    }

    impl Keyword {
        fn arc(name: &str, selector: Selector) -> Arc<dyn ContextProvider> {
            Arc::new(Self {
                descriptor: ProviderDescriptor::new(name, "test", &[], &[]),
                selector,
            })
        }
    }

    #[async_trait]
    impl ContextProvider for Keyword {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        fn can_handle(&self, query: &str) -> bool {
            self.selector.matches(query)
        }

        async fn get_context(&self, _query: &str) -> Result<ContextPayload> {
            Ok(ContextPayload::default())
        }
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(
            Keyword::arc("NetworkProvider", Selector::keywords(&["vlan", "device"])),
            false,
        );
        registry.register(Keyword::arc("TicketProvider", Selector::keywords(&["change"])), false);
        registry.register(Keyword::arc("KnowledgeProvider", Selector::Always), true);
        registry
    }

    #[test]
    fn test_routes_to_first_matching_candidate() {
        let registry = registry();

        let selection = registry.select("show me VLAN 100").unwrap();
        assert_eq!(selection.provider.name(), "NetworkProvider");
        assert!(!selection.via_fallback);

        let selection = registry.select("summarize the onboarding doc").unwrap();
        assert_eq!(selection.provider.name(), "KnowledgeProvider");
        assert!(selection.via_fallback);
    }

    #[test]
    fn test_registration_order_wins() {
        let registry = registry();
        let selection = registry.select("which device had a change yesterday").unwrap();
        assert_eq!(selection.provider.name(), "NetworkProvider");
    }

    #[test]
    fn test_selection_is_deterministic() {
        let registry = registry();
        for query in ["show me VLAN 100", "open change tickets", "hello", ""] {
            let first = registry.select(query).unwrap().provider.name().to_string();
            let second = registry.select(query).unwrap().provider.name().to_string();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_empty_registry_fails() {
        let registry = ProviderRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.select("anything"),
            Err(AppError::NoProvider { .. })
        ));
    }

    #[test]
    fn test_no_match_without_fallback_fails() {
        let mut registry = ProviderRegistry::new();
        registry.register(Keyword::arc("TicketProvider", Selector::keywords(&["change"])), false);

        assert!(registry.select("show me VLAN 100").is_err());
        assert!(registry.select("open change").is_ok());
    }

    #[test]
    fn test_capabilities_list_fallback_last() {
        let mut registry = registry();
        registry.register(Keyword::arc("SecondFallback", Selector::Always), true);

        let names: Vec<String> = registry.capabilities().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["NetworkProvider", "TicketProvider", "SecondFallback"]);
    }
}
