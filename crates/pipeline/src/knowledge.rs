//! Keyword-ranked venue knowledge from the `[[knowledge]]` config entries.

use async_trait::async_trait;
use maitre_config::KnowledgeEntryConfig;
use maitre_core::error::KnowledgeError;
use maitre_core::KnowledgeProvider;

/// Snippets returned per query.
const TOP_SNIPPETS: usize = 2;

#[derive(Debug, Clone)]
struct Snippet {
    topic: String,
    keywords: Vec<String>,
    text: String,
}

/// Answers `find_relevant_info` by counting keyword hits in the query.
#[derive(Debug, Clone, Default)]
pub struct KeywordKnowledge {
    snippets: Vec<Snippet>,
}

impl KeywordKnowledge {
    pub fn new(entries: &[KnowledgeEntryConfig]) -> Self {
        let snippets = entries
            .iter()
            .map(|e| {
                let mut keywords: Vec<String> =
                    e.keywords.iter().map(|k| k.trim().to_lowercase()).collect();
                keywords.push(e.topic.trim().to_lowercase());
                keywords.retain(|k| !k.is_empty());
                keywords.dedup();
                Snippet {
                    topic: e.topic.clone(),
                    keywords,
                    text: e.text.trim().to_string(),
                }
            })
            .collect();
        Self { snippets }
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    fn rank(&self, query: &str) -> Vec<&Snippet> {
        let lower = query.to_lowercase();
        let mut scored: Vec<(usize, usize, &Snippet)> = self
            .snippets
            .iter()
            .enumerate()
            .filter_map(|(index, snippet)| {
                let hits = snippet.keywords.iter().filter(|k| lower.contains(k.as_str())).count();
                (hits > 0).then_some((hits, index, snippet))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.into_iter().take(TOP_SNIPPETS).map(|(_, _, s)| s).collect()
    }
}

#[async_trait]
impl KnowledgeProvider for KeywordKnowledge {
    async fn find_relevant_info(&self, query: &str) -> Result<String, KnowledgeError> {
        Ok(self
            .rank(query)
            .into_iter()
            .map(|s| format!("{}: {}", s.topic, s.text))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
