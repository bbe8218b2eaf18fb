use std::sync::Arc;

use rag_engine::RagSystem;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub rag: Arc<RagSystem>,
}

impl AppState {
    pub fn new(rag: RagSystem) -> Self {
        Self { rag: Arc::new(rag) }
    }
}
