//! Knowledge provider trait — free-text facts (menu, promotions, venue info)
//! looked up by query.

use crate::error::KnowledgeError;
use async_trait::async_trait;

#[async_trait]
pub trait KnowledgeProvider: Send + Sync {
    /// Free text relevant to `query`; empty when nothing matches.
    async fn find_relevant_info(&self, query: &str) -> std::result::Result<String, KnowledgeError>;
}

/// A provider that knows nothing. Used when no knowledge is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoKnowledge;

#[async_trait]
impl KnowledgeProvider for NoKnowledge {
    async fn find_relevant_info(
        &self,
        _query: &str,
    ) -> std::result::Result<String, KnowledgeError> {
        Ok(String::new())
    }
}
