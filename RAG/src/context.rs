//! Builds the ordered message list sent to the completion gateway.

use crate::models::{Message, Role};
use crate::tokenizer::TextMeasure;

pub const DEFAULT_PERSONA: &str = "You are an AI assistant that helps people find information \
in the documents they uploaded. Answer using only the provided context. If the context does \
not contain the answer, say that you don't have enough information to answer.";

/// Upper bounds on how much prior conversation is forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimit {
    pub max_messages: usize,
    pub max_tokens: Option<usize>,
}

impl Default for HistoryLimit {
    fn default() -> Self {
        Self {
            max_messages: 20,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    persona: String,
    limit: HistoryLimit,
    measure: TextMeasure,
}

impl ContextAssembler {
    pub fn new(limit: HistoryLimit, measure: TextMeasure) -> Self {
        Self {
            persona: DEFAULT_PERSONA.to_string(),
            limit,
            measure,
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    /// Returns `[persona, retrieved context, ..history window]`.
    ///
    /// The current question is named in the context message. It is not part of
    /// `history`; the caller records it together with the answer afterwards.
    pub fn assemble(
        &self,
        history: &[Message],
        question: &str,
        retrieved_chunks: &[String],
    ) -> Vec<Message> {
        let window = self.history_window(history);

        let mut messages = Vec::with_capacity(window.len() + 2);
        messages.push(Message::system(self.persona.clone()));
        messages.push(Message::system(context_message(question, retrieved_chunks)));
        messages.extend(window.iter().cloned());
        messages
    }

    /// Newest suffix of `history` that fits the limit, starting on a user turn.
    pub fn history_window<'a>(&self, history: &'a [Message]) -> &'a [Message] {
        let mut start = history.len().saturating_sub(self.limit.max_messages);

        if let Some(budget) = self.limit.max_tokens {
            let mut used: usize = history[start..]
                .iter()
                .map(|m| self.measure.measure(&m.content))
                .sum();
            while used > budget && start < history.len() {
                used -= self.measure.measure(&history[start].content);
                start += 1;
            }
        }

        while start < history.len() && history[start].role != Role::User {
            start += 1;
        }

        if start > 0 {
            log::debug!("Dropped {} oldest history messages from context", start);
        }
        &history[start..]
    }
}

fn context_message(question: &str, retrieved_chunks: &[String]) -> String {
    let header = format!(
        "Use the following pieces of retrieved context to answer the user's question: {}",
        question.trim()
    );
    if retrieved_chunks.is_empty() {
        return format!("{header}\n\nNo relevant context was found.");
    }
    format!("{header}\n\n{}", retrieved_chunks.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler(max_messages: usize, max_tokens: Option<usize>) -> ContextAssembler {
        ContextAssembler::new(
            HistoryLimit {
                max_messages,
                max_tokens,
            },
            TextMeasure::Chars,
        )
    }

    fn conversation(turns: usize) -> Vec<Message> {
        (0..turns)
            .flat_map(|i| {
                [
                    Message::user(format!("question {i}")),
                    Message::assistant(format!("answer {i}")),
                ]
            })
            .collect()
    }

    #[test]
    fn first_two_messages_are_system() {
        let a = assembler(20, None);
        for (history, chunks) in [
            (vec![], vec![]),
            (conversation(3), vec!["doc.txt->\nsome text".to_string()]),
            (vec![Message::assistant("stray")], vec!["a".into(), "b".into()]),
        ] {
            let messages = a.assemble(&history, "why?", &chunks);
            assert_eq!(messages[0].role, Role::System);
            assert_eq!(messages[1].role, Role::System);
        }
    }

    #[test]
    fn chunks_are_joined_with_blank_lines_after_instruction() {
        let a = assembler(20, None);
        let chunks = vec!["a.txt->\nfirst".to_string(), "b.pdf->\nsecond".to_string()];
        let messages = a.assemble(&[], "What is open banking?", &chunks);

        assert_eq!(messages.len(), 2);
        let context = &messages[1].content;
        assert!(context.starts_with("Use the following pieces of retrieved context"));
        assert!(context.contains("What is open banking?"));
        assert!(context.ends_with("a.txt->\nfirst\n\nb.pdf->\nsecond"));
    }

    #[test]
    fn history_follows_system_messages_in_order() {
        let a = assembler(20, None);
        let history = conversation(2);
        let messages = a.assemble(&history, "next", &[]);
        assert_eq!(&messages[2..], history.as_slice());
    }

    #[test]
    fn assemble_is_idempotent_and_leaves_input_alone() {
        let a = assembler(3, Some(40));
        let history = conversation(4);
        let before = history.clone();
        let chunks = vec!["x.txt->\ncontent".to_string()];

        let first = a.assemble(&history, "q", &chunks);
        let second = a.assemble(&history, "q", &chunks);
        assert_eq!(first, second);
        assert_eq!(history, before);
    }

    #[test]
    fn message_cap_evicts_oldest_and_starts_on_user() {
        let a = assembler(3, None);
        let history = conversation(3);
        // Last three messages start with an assistant reply, which is dropped.
        let window = a.history_window(&history);
        assert_eq!(window, &history[4..]);
        assert_eq!(window[0].content, "question 2");
    }

    #[test]
    fn token_budget_evicts_oldest_turns() {
        // "question N" is 10 chars and "answer N" is 8, so a turn costs 18.
        let a = assembler(100, Some(40));
        let history = conversation(4);
        let window = a.history_window(&history);
        assert_eq!(window.len(), 4);
        assert_eq!(window[0].content, "question 2");
    }

    #[test]
    fn zero_budget_forwards_no_history() {
        let a = assembler(0, None);
        let messages = a.assemble(&conversation(2), "q", &[]);
        assert_eq!(messages.len(), 2);
    }
}
