//! Concrete context providers

mod change;
mod knowledge;
mod network;

pub use change::{ChangeProvider, CHANGE_EXTRACTION_PROMPT};
pub use knowledge::{KnowledgeProvider, KNOWLEDGE_SOURCE};
pub use network::NetworkProvider;
