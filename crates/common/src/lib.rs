//! NetRAG Common Library
//!
//! Shared code for the NetRAG engine and gateway:
//! - Error types and handling
//! - Configuration management
//! - Database pool and schema
//! - Deduplicated embedding store with cosine search
//! - Conversation memory
//! - Embedding and generation backend clients
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod memory;
pub mod metrics;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::Generator;
pub use memory::{ConversationMemory, ConversationTurn};
pub use store::{EmbeddingRecord, EmbeddingStore, ScoredRecord};

/// Open key-value map attached to records and turns
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding dimension (E5-small sized vectors)
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

/// Similarity cutoff below which retrieved chunks are discarded
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.8;

/// Maximum chunks returned by a knowledge-base lookup
pub const DEFAULT_TOP_K: usize = 5;

/// Turns of history supplied to each query
pub const DEFAULT_HISTORY_WINDOW: usize = 5;
