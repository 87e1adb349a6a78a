//! Knowledge lookup capability.

use async_trait::async_trait;
use crew_common::{Result, Specialty};
use crew_knowledge::KnowledgeStore;

/// Specialty-scoped retrieval over clinical guidelines.
#[async_trait]
pub trait KnowledgeLookup: Send + Sync {
    /// Formatted documents relevant to `query`, or a "no documents" message.
    async fn lookup(&self, specialty: Specialty, query: &str, top_k: usize) -> Result<String>;
}

#[async_trait]
impl KnowledgeLookup for KnowledgeStore {
    async fn lookup(&self, specialty: Specialty, query: &str, top_k: usize) -> Result<String> {
        KnowledgeStore::lookup(self, specialty, query, top_k).await
    }
}
