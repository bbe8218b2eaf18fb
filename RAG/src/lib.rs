//! Retrieval-augmented question answering over uploaded documents.
//!
//! Documents are split into sentence-aligned chunks, embedded and written to a
//! vector index. Questions are answered by retrieving the closest chunks and
//! sending them, with the session's recent history, to a completion model.

pub mod chunker;
pub mod completion_service;
pub mod config;
pub mod context;
pub mod conversation;
pub mod document_processor;
pub mod embedding_service;
pub mod error;
mod http_client;
pub mod models;
pub mod query_service;
pub mod tokenizer;
pub mod vector_index;

use std::sync::Arc;

pub use chunker::{chunk, Chunker};
pub use completion_service::{AzureOpenAiChat, CompletionGateway, GeminiChat};
pub use config::RagConfig;
pub use context::{ContextAssembler, HistoryLimit};
pub use conversation::{Conversation, SessionStore, DEFAULT_SESSION};
pub use document_processor::IngestionService;
pub use embedding_service::{AzureOpenAiEmbeddings, EmbeddingGateway, GeminiEmbeddings, HashingEmbeddings};
pub use error::{ErrorKind, RagError, Result};
pub use models::*;
pub use query_service::QueryService;
pub use tokenizer::{SizeUnit, TextMeasure};
pub use vector_index::{AzureSearchIndex, InMemoryIndex, VectorIndex};

use config::{CompletionProvider, EmbeddingProvider, VectorIndexProvider};

/// The three external collaborators the pipelines talk to.
#[derive(Clone)]
pub struct Gateways {
    pub embeddings: Arc<dyn EmbeddingGateway>,
    pub index: Arc<dyn VectorIndex>,
    pub completion: Arc<dyn CompletionGateway>,
}

impl Gateways {
    /// Builds the providers selected in `config`.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        let client = http_client::build_client(config.http_timeout)?;

        let embeddings: Arc<dyn EmbeddingGateway> = match config.embedding_provider {
            EmbeddingProvider::AzureOpenAi => Arc::new(AzureOpenAiEmbeddings::new(
                client.clone(),
                missing(config.azure_embedding.as_ref(), "Azure OpenAI embedding")?,
            )),
            EmbeddingProvider::Gemini => Arc::new(GeminiEmbeddings::new(
                client.clone(),
                missing(config.gemini_embedding.as_ref(), "Gemini embedding")?,
            )),
            EmbeddingProvider::Hashing => Arc::new(HashingEmbeddings::new(config.embedding_dimensions)),
        };

        let completion: Arc<dyn CompletionGateway> = match config.completion_provider {
            CompletionProvider::AzureOpenAi => Arc::new(AzureOpenAiChat::new(
                client.clone(),
                missing(config.azure_chat.as_ref(), "Azure OpenAI chat")?,
            )),
            CompletionProvider::Gemini => Arc::new(GeminiChat::new(
                client.clone(),
                missing(config.gemini_chat.as_ref(), "Gemini chat")?,
            )),
        };

        let index: Arc<dyn VectorIndex> = match config.vector_index_provider {
            VectorIndexProvider::AzureSearch => Arc::new(AzureSearchIndex::new(
                client,
                missing(config.azure_search.as_ref(), "Azure AI Search")?.clone(),
                config.embedding_dimensions,
            )),
            VectorIndexProvider::Memory => Arc::new(InMemoryIndex::new()),
        };

        Ok(Self {
            embeddings,
            index,
            completion,
        })
    }
}

fn missing<'a, T>(section: Option<&'a T>, name: &str) -> Result<&'a T> {
    section.ok_or_else(|| RagError::Config(format!("{name} settings are missing")))
}

/// Ingestion and query pipelines wired to one set of gateways.
pub struct RagSystem {
    pub ingestion: Arc<IngestionService>,
    pub query: Arc<QueryService>,
    pub sessions: Arc<SessionStore>,
    index: Arc<dyn VectorIndex>,
}

impl RagSystem {
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        let gateways = Gateways::from_config(config)?;
        Self::with_gateways(config, gateways)
    }

    pub fn with_gateways(config: &RagConfig, gateways: Gateways) -> Result<Self> {
        let measure = TextMeasure::for_unit(config.chunk_size_unit)?;
        let sessions = Arc::new(SessionStore::new(config.session_ttl, config.max_sessions));

        let ingestion = IngestionService::new(
            Chunker::new(config.chunk_size, measure.clone()),
            gateways.embeddings.clone(),
            gateways.index.clone(),
            config.embedding_concurrency,
        );
        let query = QueryService::new(
            gateways.embeddings,
            gateways.index.clone(),
            gateways.completion,
            ContextAssembler::new(config.history, measure),
            sessions.clone(),
            config.top_k,
        );

        Ok(Self {
            ingestion: Arc::new(ingestion),
            query: Arc::new(query),
            sessions,
            index: gateways.index,
        })
    }

    /// Creates the vector index if needed. Call once before serving.
    pub async fn initialize(&self) -> Result<()> {
        log::info!("Initializing RAG system...");
        self.index.ensure_index().await?;
        log::info!("RAG system initialized successfully!");
        Ok(())
    }
}
