//! Per-session conversation memory.
//!
//! Keeps the last `window` exchanges (user + assistant pairs) verbatim.
//! When an exchange falls out of the window its salient terms (brands,
//! model names, vehicle topics) are folded into a running context summary,
//! so a later "how much does it cost?" can still be resolved against a car
//! discussed ten turns ago.

use std::collections::VecDeque;

use carwise_core::message::{Message, Turn, TurnRole};
use serde::Serialize;

use crate::router::contains_term;

/// Most terms the context summary retains. Oldest are dropped first.
pub const MAX_SUMMARY_TERMS: usize = 24;

/// Vehicle topics recognised in conversation text: (patterns, label).
const TOPICS: &[(&[&str], &str)] = &[
    (&["suv", "crossover"], "SUV"),
    (&["sedan"], "sedan"),
    (&["hatchback"], "hatchback"),
    (&["bán tải", "pickup"], "bán tải"),
    (&["xe điện", "ev", "electric"], "xe điện"),
    (&["hybrid"], "hybrid"),
    (&["bảo dưỡng", "maintenance"], "bảo dưỡng"),
    (&["tiết kiệm nhiên liệu", "tiêu hao nhiên liệu", "fuel economy"], "tiết kiệm nhiên liệu"),
    (&["an toàn", "safety", "túi khí", "airbag"], "an toàn"),
    (&["giá", "price", "cost"], "giá"),
];

const BRANDS: &[&str] = &[
    "Toyota", "Honda", "Hyundai", "Kia", "Mazda", "Ford", "VinFast", "Mitsubishi", "Nissan",
    "Suzuki", "Subaru", "Mercedes", "BMW", "Audi", "Lexus", "Porsche", "Tesla", "Volkswagen",
    "Peugeot", "Chevrolet", "Volvo", "BYD", "MG",
];

/// Words that point back at something said earlier.
const REFERENTIAL: &[&str] = &[
    "nó", "xe đó", "xe này", "mẫu đó", "mẫu này", "dòng đó", "dòng này", "chiếc đó", "chiếc này",
    "it", "its", "that car", "this car", "that model", "this model", "they", "them",
];

/// Snapshot for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationInfo {
    pub exchanges: usize,
    pub turns: usize,
    pub summary: String,
    pub recent_topics: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    turns: VecDeque<Turn>,
    /// Window size in exchanges; the turn limit is twice this
    window: usize,
    summary_terms: Vec<String>,
}

impl ConversationMemory {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            turns: VecDeque::with_capacity(window * 2 + 1),
            window,
            summary_terms: Vec::new(),
        }
    }

    /// Append a turn, evicting the oldest exchange once the window is full.
    pub fn add_turn(&mut self, role: TurnRole, content: impl Into<String>) {
        self.turns.push_back(Turn::new(role, content));
        while self.turns.len() > self.max_turns() {
            self.evict_oldest_exchange();
        }
    }

    fn max_turns(&self) -> usize {
        self.window * 2
    }

    fn evict_oldest_exchange(&mut self) {
        let Some(first) = self.turns.pop_front() else {
            return;
        };
        let mut evicted = vec![first];
        if evicted[0].role == TurnRole::User
            && self.turns.front().is_some_and(|t| t.role == TurnRole::Assistant)
        {
            evicted.extend(self.turns.pop_front());
        }
        for turn in &evicted {
            self.fold_into_summary(&turn.content);
        }
    }

    fn fold_into_summary(&mut self, text: &str) {
        for term in extract_terms(text) {
            self.summary_terms.retain(|t| !t.eq_ignore_ascii_case(&term));
            self.summary_terms.push(term);
        }
        if self.summary_terms.len() > MAX_SUMMARY_TERMS {
            let excess = self.summary_terms.len() - MAX_SUMMARY_TERMS;
            self.summary_terms.drain(..excess);
        }
    }

    /// System message (with the context summary, if any) followed by every
    /// retained turn, oldest first.
    pub fn build_prompt_messages(&self, system_prompt: &str) -> Vec<Message> {
        let mut system = system_prompt.to_string();
        if let Some(summary) = self.summary() {
            system.push_str("\n\nNgữ cảnh các lượt trò chuyện trước: ");
            system.push_str(&summary);
        }

        let mut messages = Vec::with_capacity(self.turns.len() + 1);
        messages.push(Message::system(system));
        messages.extend(self.turns.iter().map(Turn::to_message));
        messages
    }

    /// Enrich a query for retrieval when it refers back to earlier turns.
    /// Returns the query unchanged when there is nothing to resolve.
    pub fn contextualize(&self, query: &str) -> String {
        let lowered = query.to_lowercase();
        if !REFERENTIAL.iter().any(|w| contains_term(&lowered, w)) {
            return query.to_string();
        }

        let mut terms: Vec<String> = Vec::new();
        let recent = self.turns.iter().rev().take(2).collect::<Vec<_>>();
        for source in self
            .summary_terms
            .iter()
            .cloned()
            .chain(recent.into_iter().rev().flat_map(|t| extract_terms(&t.content)))
        {
            if !terms.iter().any(|t| t.eq_ignore_ascii_case(&source))
                && !contains_term(&lowered, &source.to_lowercase())
            {
                terms.push(source);
            }
        }

        if terms.is_empty() {
            query.to_string()
        } else {
            format!("{query} ({})", terms.join(", "))
        }
    }

    /// Clear turns and summary.
    pub fn reset(&mut self) {
        self.turns.clear();
        self.summary_terms.clear();
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn summary_terms(&self) -> &[String] {
        &self.summary_terms
    }

    pub fn summary(&self) -> Option<String> {
        (!self.summary_terms.is_empty()).then(|| self.summary_terms.join(", "))
    }

    pub fn info(&self) -> ConversationInfo {
        let mut recent_topics: Vec<String> = Vec::new();
        for term in self.turns.iter().flat_map(|t| extract_terms(&t.content)) {
            recent_topics.retain(|t| !t.eq_ignore_ascii_case(&term));
            recent_topics.push(term);
        }
        let keep_from = recent_topics.len().saturating_sub(5);

        ConversationInfo {
            exchanges: self
                .turns
                .iter()
                .filter(|t| t.role == TurnRole::User)
                .count(),
            turns: self.turns.len(),
            summary: self.summary().unwrap_or_default(),
            recent_topics: recent_topics.split_off(keep_from),
        }
    }
}

/// Salient terms in order of first appearance: brands, model designations
/// (tokens mixing letters with digits or hyphens, like "CR-V" or "VF8"),
/// then vehicle topics.
pub fn extract_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    let mut push = |term: String| {
        if !terms.iter().any(|t| t.eq_ignore_ascii_case(&term)) {
            terms.push(term);
        }
    };

    for raw in text.split_whitespace() {
        let token = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '-');
        let token = token.trim_matches('-');
        if token.is_empty() {
            continue;
        }
        if let Some(brand) = BRANDS.iter().find(|b| b.eq_ignore_ascii_case(token)) {
            push((*brand).to_string());
        } else if is_model_designation(token) {
            push(token.to_string());
        }
    }

    let lowered = text.to_lowercase();
    for (patterns, label) in TOPICS {
        if patterns.iter().any(|p| contains_term(&lowered, p)) {
            push((*label).to_string());
        }
    }

    terms
}

fn is_model_designation(token: &str) -> bool {
    if token.chars().count() < 2 || !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return false;
    }
    let has_upper = token.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = token.chars().any(|c| c.is_ascii_digit());
    let has_lower = token.chars().any(|c| c.is_ascii_lowercase());
    let has_hyphen = token.contains('-');
    has_upper && (has_digit || (has_hyphen && !has_lower))
}

#[cfg(test)]
mod tests {
    use super::*;
    use carwise_core::message::Role;

    fn pairs(messages: &[Message]) -> Vec<(Role, String)> {
        messages.iter().map(|m| (m.role, m.content.clone())).collect()
    }

    fn exchange(memory: &mut ConversationMemory, user: &str, assistant: &str) {
        memory.add_turn(TurnRole::User, user);
        memory.add_turn(TurnRole::Assistant, assistant);
    }

    #[test]
    fn prompt_starts_with_system_then_turns() {
        let mut memory = ConversationMemory::new(5);
        exchange(&mut memory, "Giá Honda CR-V?", "Khoảng 1 tỷ.");

        let messages = memory.build_prompt_messages("Bạn là chuyên gia ô tô.");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "Bạn là chuyên gia ô tô.");
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[2].content, "Khoảng 1 tỷ.");
    }

    #[test]
    fn prompt_is_deterministic() {
        let build = || {
            let mut memory = ConversationMemory::new(1);
            exchange(&mut memory, "Tell me about the Toyota Camry", "A midsize sedan.");
            exchange(&mut memory, "And the Mazda CX-5?", "A compact SUV.");
            memory.build_prompt_messages("sys")
        };
        assert_eq!(pairs(&build()), pairs(&build()));
    }

    #[test]
    fn window_evicts_oldest_exchange() {
        let mut memory = ConversationMemory::new(2);
        exchange(&mut memory, "Honda CR-V an toàn không?", "Có 6 túi khí.");
        exchange(&mut memory, "q2", "a2");
        exchange(&mut memory, "q3", "a3");

        assert_eq!(memory.len(), 4);
        let first = memory.turns().next().unwrap();
        assert_eq!(first.content, "q2");

        let summary = memory.summary().unwrap();
        assert!(summary.contains("Honda"));
        assert!(summary.contains("CR-V"));
        assert!(summary.contains("an toàn"));
    }

    #[test]
    fn never_exceeds_window() {
        let mut memory = ConversationMemory::new(3);
        for i in 0..20 {
            exchange(&mut memory, &format!("q{i}"), &format!("a{i}"));
            assert!(memory.len() <= 6);
        }
    }

    #[test]
    fn summary_appears_in_system_message() {
        let mut memory = ConversationMemory::new(1);
        exchange(&mut memory, "VinFast VF8 giá bao nhiêu?", "Khoảng 1 tỷ.");
        exchange(&mut memory, "q2", "a2");

        let messages = memory.build_prompt_messages("sys");
        assert!(messages[0].content.starts_with("sys\n\n"));
        assert!(messages[0].content.contains("VinFast"));
        assert!(messages[0].content.contains("VF8"));
    }

    #[test]
    fn reset_matches_fresh_memory() {
        let mut used = ConversationMemory::new(1);
        exchange(&mut used, "Audi A4?", "Sedan hạng sang.");
        exchange(&mut used, "q2", "a2");
        used.reset();
        exchange(&mut used, "hello", "hi");

        let mut fresh = ConversationMemory::new(1);
        exchange(&mut fresh, "hello", "hi");

        assert_eq!(pairs(&used.build_prompt_messages("s")), pairs(&fresh.build_prompt_messages("s")));
        assert!(used.summary().is_none());
    }

    #[test]
    fn summary_is_bounded() {
        let mut memory = ConversationMemory::new(1);
        for i in 0..40 {
            exchange(&mut memory, &format!("Model X{i}"), "ok");
        }
        assert!(memory.summary_terms().len() <= MAX_SUMMARY_TERMS);
        assert_eq!(memory.summary_terms().last().unwrap(), "X38");
    }

    #[test]
    fn extract_terms_finds_brands_models_and_topics() {
        let terms = extract_terms("So sánh honda CR-V và Mazda CX-5, xe nào tiết kiệm nhiên liệu hơn?");
        assert_eq!(terms, vec!["Honda", "CR-V", "Mazda", "CX-5", "tiết kiệm nhiên liệu"]);
    }

    #[test]
    fn extract_terms_ignores_plain_words() {
        assert!(extract_terms("Tôi Muốn Mua Xe").is_empty());
    }

    #[test]
    fn contextualize_resolves_references() {
        let mut memory = ConversationMemory::new(5);
        exchange(&mut memory, "Kể về Toyota Camry 2.5Q", "Camry là sedan hạng D.");

        let query = memory.contextualize("Nó có an toàn không?");
        assert!(query.starts_with("Nó có an toàn không? ("));
        assert!(query.contains("Toyota"));
        assert!(query.contains("sedan"));
    }

    #[test]
    fn contextualize_leaves_plain_queries() {
        let mut memory = ConversationMemory::new(5);
        exchange(&mut memory, "Toyota Camry?", "Sedan.");
        assert_eq!(memory.contextualize("Giá Kia Morning?"), "Giá Kia Morning?");
        assert_eq!(ConversationMemory::new(5).contextualize("Nó bao nhiêu tiền?"), "Nó bao nhiêu tiền?");
    }

    #[test]
    fn info_counts_exchanges() {
        let mut memory = ConversationMemory::new(5);
        exchange(&mut memory, "Hyundai Tucson?", "SUV cỡ C.");
        let info = memory.info();
        assert_eq!(info.exchanges, 1);
        assert_eq!(info.turns, 2);
        assert_eq!(info.summary, "");
        assert_eq!(info.recent_topics, vec!["Hyundai", "SUV"]);
    }
}
