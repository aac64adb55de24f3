//! NetRAG Context Engine
//!
//! Routes each query to the one context provider that should answer it,
//! combines the provider's context with recent conversation history, and
//! drives generation:
//! - Provider capability interface and prompt templating
//! - Ordered first-match provider registry with a fallback
//! - Knowledge-base, SD-WAN and ServiceNow providers
//! - Query orchestration with turn recording
//! - Deduplicating document indexer

pub mod indexer;
pub mod orchestrator;
pub mod provider;
pub mod providers;
pub mod router;
pub mod services;

pub use indexer::{IndexOutcome, IndexReport, Indexer};
pub use orchestrator::{Orchestrator, QueryAnswer};
pub use provider::{ContextPayload, ContextProvider, ProviderDescriptor, SourceLink};
pub use router::{ProviderRegistry, Selection};
