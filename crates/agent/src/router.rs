//! Keyword router: picks the tier a query tries first.
//!
//! News terms send the query to the agent. Everything else, greetings
//! included, starts at the knowledge base.

use carwise_config::RouterConfig;
use carwise_core::route::{RouteDecision, RoutePath};

#[derive(Debug, Clone)]
pub struct QueryRouter {
    news_terms: Vec<String>,
}

impl QueryRouter {
    pub fn new(news_terms: Vec<String>) -> Self {
        Self {
            news_terms: news_terms
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(config.news_keywords.clone())
    }

    /// Classify a query. Never fails; the fallback is `knowledge_base`.
    ///
    /// Only `agent` and `knowledge_base` come out of here. `direct_chat`
    /// is reached by falling back, never by routing.
    pub fn classify(&self, query: &str) -> RouteDecision {
        let text = query.to_lowercase();

        if let Some(term) = self.news_terms.iter().find(|t| contains_term(&text, t)) {
            return RouteDecision::new(RoutePath::Agent, format!("news keyword '{term}'"));
        }

        RouteDecision::new(RoutePath::KnowledgeBase, "default")
    }
}

impl Default for QueryRouter {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

/// Whole-word match of an already-lowercased `term` inside `text`.
///
/// Word edges are Unicode-aware, so "tin tức" matches in "Tin tức mới" but
/// "news" does not match inside "newsletter".
pub(crate) fn contains_term(text: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(pos) = text[from..].find(term) {
        let start = from + pos;
        let end = start + term.len();
        let before_ok = text[..start].chars().next_back().is_none_or(|c| !c.is_alphanumeric());
        let after_ok = text[end..].chars().next().is_none_or(|c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        // Advance past the first char of this match
        from = start + text[start..].chars().next().map_or(1, char::len_utf8);
    }
    false
}
