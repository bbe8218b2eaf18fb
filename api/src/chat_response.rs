use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub session_id: String,
    pub sources: Vec<String>,
    pub token_usage: u64,
}
