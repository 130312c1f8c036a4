//! Assembly of the bounded context sent to the language model.

use std::collections::HashSet;

use serde::Serialize;

use crate::conversation::ConversationMessage;
use crate::document::SearchResult;

/// Opens the knowledge-base block in a rendered prompt.
pub const CONTEXT_HEADER: &str = "=== KNOWLEDGE BASE CONTEXT ===";
/// Closes the knowledge-base block in a rendered prompt.
pub const CONTEXT_FOOTER: &str = "=== END CONTEXT ===";
/// Separates retrieved sources inside the knowledge-base block.
pub const SOURCE_SEPARATOR: &str = "---";

/// Everything the model sees for one turn: retrieved chunks, recent
/// history, and the new query, in that order.
///
/// Retrieved chunks are never dropped once selected. When the rendered
/// payload exceeds the character budget, history is trimmed from the oldest
/// end; if chunks and query alone exceed it, the payload is sent over
/// budget with no history.
#[derive(Debug, Clone, Serialize)]
pub struct ContextPayload {
    /// Retrieved chunks, best first, unique by chunk id.
    pub retrieved: Vec<SearchResult>,
    /// Recent messages, oldest first.
    pub history: Vec<ConversationMessage>,
    /// The new user query.
    pub query: String,
    /// How many history messages were trimmed to fit the budget.
    pub trimmed_history: usize,
}

impl ContextPayload {
    /// Build a payload that fits `max_chars` where possible.
    pub fn assemble(
        retrieved: Vec<SearchResult>,
        history: Vec<ConversationMessage>,
        query: impl Into<String>,
        max_chars: usize,
    ) -> Self {
        let mut seen = HashSet::new();
        let retrieved: Vec<SearchResult> =
            retrieved.into_iter().filter(|r| seen.insert(r.chunk.id.clone())).collect();

        let mut payload = Self { retrieved, history, query: query.into(), trimmed_history: 0 };
        while !payload.history.is_empty() && payload.char_len() > max_chars {
            payload.history.remove(0);
            payload.trimmed_history += 1;
        }
        payload
    }

    /// The knowledge-base block, or `None` when nothing was retrieved.
    pub fn knowledge_block(&self) -> Option<String> {
        if self.retrieved.is_empty() {
            return None;
        }
        let sections: Vec<String> = self
            .retrieved
            .iter()
            .map(|r| format!("Source: {}\n{}", r.chunk.display_source(), r.chunk.text))
            .collect();
        Some(format!(
            "{CONTEXT_HEADER}\n{}\n{CONTEXT_FOOTER}",
            sections.join(&format!("\n\n{SOURCE_SEPARATOR}\n"))
        ))
    }

    /// The final user turn: the knowledge-base block followed by the query.
    pub fn user_prompt(&self) -> String {
        match self.knowledge_block() {
            Some(block) => format!("{block}\n\n{}", self.query),
            None => self.query.clone(),
        }
    }

    /// Flatten the payload to a single prompt string.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(block) = self.knowledge_block() {
            out.push_str(&block);
            out.push_str("\n\n");
        }
        for message in &self.history {
            out.push_str(message.role.as_str());
            out.push_str(": ");
            out.push_str(&message.text);
            out.push('\n');
        }
        if !self.history.is_empty() {
            out.push('\n');
        }
        out.push_str("user: ");
        out.push_str(&self.query);
        out
    }

    /// Size of the rendered payload in characters.
    pub fn char_len(&self) -> usize {
        self.render().chars().count()
    }
}
