use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ChatPayload {
    pub question: String,
    /// Conversation to continue; the shared default session when absent.
    #[serde(default)]
    pub session_id: Option<String>,
}
