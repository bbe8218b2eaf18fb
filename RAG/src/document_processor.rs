use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use uuid::Uuid;

use crate::chunker::Chunker;
use crate::embedding_service::EmbeddingGateway;
use crate::error::{RagError, Result};
use crate::models::*;
use crate::vector_index::VectorIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    pub fn from_filename(filename: &str) -> Result<Self> {
        let extension = Path::new(filename)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());

        match extension.as_deref() {
            Some("pdf") => Ok(DocumentKind::Pdf),
            Some("txt") => Ok(DocumentKind::Text),
            _ => Err(RagError::input(format!(
                "Unsupported file type: '{filename}'. Only .pdf and .txt files are accepted."
            ))),
        }
    }
}

/// Extracts plain text from an uploaded file's bytes.
pub async fn extract_text(kind: DocumentKind, bytes: Vec<u8>) -> Result<String> {
    match kind {
        DocumentKind::Text => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        DocumentKind::Pdf => tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| RagError::Internal(format!("PDF extraction task failed: {e}")))?
            .map_err(|e| RagError::input(format!("Error reading PDF: {e}"))),
    }
}

/// Reads a local document; a missing or unreadable file is reported with its path.
pub async fn read_document(path: &Path) -> Result<(String, Vec<u8>)> {
    let bytes = tokio::fs::read(path).await.map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => RagError::NotFound {
            path: path.to_path_buf(),
            source,
        },
        _ => RagError::Internal(format!("failed to read '{}': {source}", path.display())),
    })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| RagError::input(format!("'{}' is not a file", path.display())))?;

    Ok((filename, bytes))
}

/// Turns a document into indexed chunks: extract, chunk, embed, upsert.
pub struct IngestionService {
    chunker: Chunker,
    embeddings: Arc<dyn EmbeddingGateway>,
    index: Arc<dyn VectorIndex>,
    concurrency: usize,
}

impl IngestionService {
    pub fn new(
        chunker: Chunker,
        embeddings: Arc<dyn EmbeddingGateway>,
        index: Arc<dyn VectorIndex>,
        concurrency: usize,
    ) -> Self {
        Self {
            chunker,
            embeddings,
            index,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn ingest(&self, filename: &str, bytes: Vec<u8>) -> Result<IngestReport> {
        let source_name = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| RagError::input("No file name provided"))?;

        let kind = DocumentKind::from_filename(&source_name)?;
        log::info!("Processing {:?} document: {}", kind, source_name);

        let text = extract_text(kind, bytes).await?;
        let chunks = self.chunker.chunk_document(&source_name, &text);
        if chunks.is_empty() {
            return Err(RagError::input(format!("'{source_name}' contains no text")));
        }

        let embeddings = self.embed_chunks(&chunks).await?;

        let documents: Vec<IndexedDocument> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedDocument {
                id: Uuid::new_v4().to_string(),
                source_name: chunk.source_name,
                content: chunk.text,
                embedding,
            })
            .collect();
        let chunk_count = documents.len();

        self.index.upsert(documents).await?;
        log::info!("Indexed {} chunks from {}", chunk_count, source_name);

        Ok(IngestReport {
            source_name,
            chunk_count,
        })
    }

    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport> {
        let (filename, bytes) = read_document(path).await?;
        self.ingest(&filename, bytes).await
    }

    /// Embeds chunks in order, at most `concurrency` requests in flight.
    /// The first failure aborts the whole document.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let requests: Vec<_> = chunks.iter().map(|c| self.embeddings.embed(&c.text)).collect();
        let embeddings: Vec<Vec<f32>> = stream::iter(requests)
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        log::debug!("Generated {} embeddings", embeddings.len());
        Ok(embeddings)
    }
}
