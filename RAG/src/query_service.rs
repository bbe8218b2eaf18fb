use std::sync::Arc;

use crate::completion_service::CompletionGateway;
use crate::context::ContextAssembler;
use crate::conversation::SessionStore;
use crate::embedding_service::EmbeddingGateway;
use crate::error::{RagError, Result};
use crate::models::*;
use crate::vector_index::VectorIndex;

/// Answers questions against the index, keeping per-session history.
pub struct QueryService {
    embeddings: Arc<dyn EmbeddingGateway>,
    index: Arc<dyn VectorIndex>,
    completion: Arc<dyn CompletionGateway>,
    assembler: ContextAssembler,
    sessions: Arc<SessionStore>,
    top_k: usize,
}

impl QueryService {
    pub fn new(
        embeddings: Arc<dyn EmbeddingGateway>,
        index: Arc<dyn VectorIndex>,
        completion: Arc<dyn CompletionGateway>,
        assembler: ContextAssembler,
        sessions: Arc<SessionStore>,
        top_k: usize,
    ) -> Self {
        Self {
            embeddings,
            index,
            completion,
            assembler,
            sessions,
            top_k,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Retrieves context for `question`, asks the model and records the turn.
    ///
    /// The turn is appended only once the model has answered, so a failed call
    /// leaves the session untouched.
    pub async fn ask(&self, session_id: &str, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::input("Question must not be empty"));
        }

        let query_embedding = self.embeddings.embed(question).await?;
        let retrieved = self
            .index
            .search(question, &query_embedding, self.top_k)
            .await?;
        log::info!("Found {} relevant chunks", retrieved.len());

        let context: Vec<String> = retrieved.iter().map(RetrievedChunk::to_context_entry).collect();
        let history = self.sessions.snapshot(session_id).await;
        let messages = self.assembler.assemble(&history, question, &context);
        log::debug!(
            "Sending {} messages ({} from history) for session {}",
            messages.len(),
            messages.len() - 2,
            session_id
        );

        let completion = self.completion.complete(&messages).await?;
        self.sessions
            .append_turn(session_id, question, &completion.answer)
            .await;

        Ok(Answer {
            answer: completion.answer,
            token_usage: completion.token_usage,
            sources: distinct_sources(&retrieved),
        })
    }
}

fn distinct_sources(retrieved: &[RetrievedChunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for chunk in retrieved {
        if !sources.contains(&chunk.source_name) {
            sources.push(chunk.source_name.clone());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_keep_rank_order_without_duplicates() {
        let hit = |source: &str| RetrievedChunk {
            source_name: source.into(),
            text: String::new(),
            score: 0.0,
        };
        let sources = distinct_sources(&[hit("b.pdf"), hit("a.txt"), hit("b.pdf")]);
        assert_eq!(sources, vec!["b.pdf", "a.txt"]);
    }
}
