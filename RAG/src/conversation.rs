//! Conversation history, kept per session.
//!
//! A [`Conversation`] only ever grows: user and assistant messages are appended
//! in the order they were produced and never reordered. System messages are
//! rejected; they are built per request by the context assembler.
//!
//! [`SessionStore`] maps session ids to conversations and bounds memory with a
//! TTL on idle sessions and a cap on the number of live sessions (least
//! recently used goes first).

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::{RagError, Result};
use crate::models::{Message, Role};

pub const DEFAULT_SESSION: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, role: Role, content: impl Into<String>) -> Result<()> {
        if role == Role::System {
            return Err(RagError::input(
                "system messages are not stored in conversation history",
            ));
        }
        self.messages.push(Message::new(role, content));
        Ok(())
    }

    pub fn append_turn(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.messages.push(Message::user(question));
        self.messages.push(Message::assistant(answer));
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[derive(Debug)]
struct SessionEntry {
    conversation: Conversation,
    last_access: Instant,
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    ttl: Duration,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Copy of the session's history; empty for unknown or expired sessions.
    pub async fn snapshot(&self, session_id: &str) -> Vec<Message> {
        let sessions = self.sessions.read().await;
        match sessions.get(session_id) {
            Some(entry) if !self.is_expired(entry, Instant::now()) => {
                entry.conversation.snapshot()
            }
            _ => Vec::new(),
        }
    }

    pub async fn append(&self, session_id: &str, role: Role, content: impl Into<String>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let entry = self.touch(&mut sessions, session_id);
        entry.conversation.append(role, content)
    }

    /// Appends a question and its answer under one lock so concurrent turns
    /// on the same session cannot interleave.
    pub async fn append_turn(&self, session_id: &str, question: &str, answer: &str) {
        let mut sessions = self.sessions.write().await;
        let entry = self.touch(&mut sessions, session_id);
        entry.conversation.append_turn(question, answer);
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    /// Number of live (non-expired) sessions.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|entry| !self.is_expired(entry, now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        self.purge(&mut sessions, Instant::now())
    }

    fn is_expired(&self, entry: &SessionEntry, now: Instant) -> bool {
        now.duration_since(entry.last_access) >= self.ttl
    }

    fn purge(&self, sessions: &mut HashMap<String, SessionEntry>, now: Instant) -> usize {
        let before = sessions.len();
        sessions.retain(|_, entry| !self.is_expired(entry, now));
        let purged = before - sessions.len();
        if purged > 0 {
            log::debug!("Purged {} expired sessions", purged);
        }
        purged
    }

    fn touch<'a>(
        &self,
        sessions: &'a mut HashMap<String, SessionEntry>,
        session_id: &str,
    ) -> &'a mut SessionEntry {
        let now = Instant::now();
        self.purge(sessions, now);

        if !sessions.contains_key(session_id) && sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                log::info!("Session limit reached, evicting least recently used session {}", id);
                sessions.remove(&id);
            }
        }

        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                conversation: Conversation::new(),
                last_access: now,
            });
        entry.last_access = now;
        entry
    }
}
