//! Vector index gateways.
//!
//! The index stores one [`IndexedDocument`] per chunk and answers hybrid
//! (keyword plus vector) queries with hits ranked by descending relevance.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use crate::config::AzureSearchConfig;
use crate::embedding_service::{cosine_similarity, tokenize};
use crate::error::{RagError, Result};
use crate::http_client::ensure_success;
use crate::models::{IndexedDocument, RetrievedChunk};

const SERVICE: &str = "vector index";

/// Neighbours requested from the vector half of a hybrid query.
pub const K_NEAREST_NEIGHBORS: usize = 5;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates the index if it does not exist yet.
    async fn ensure_index(&self) -> Result<()>;

    async fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<()>;

    async fn search(
        &self,
        query_text: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>>;
}

/// Azure AI Search over its REST API.
pub struct AzureSearchIndex {
    client: Client,
    config: AzureSearchConfig,
    dimensions: usize,
}

#[derive(Serialize)]
struct UploadAction<'a> {
    #[serde(rename = "@search.action")]
    action: &'static str,
    id: &'a str,
    filename: &'a str,
    content: &'a str,
    embedding: &'a [f32],
}

#[derive(Deserialize)]
struct SearchResponse {
    value: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "@search.score", default)]
    score: f32,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    content: String,
}

/// Per-document outcome of an index batch. A 207 response carries failures here.
#[derive(Deserialize)]
struct IndexBatchResponse {
    value: Vec<IndexingResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexingResult {
    key: String,
    status: bool,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    status_code: Option<u16>,
}

impl IndexBatchResponse {
    fn into_result(self) -> Result<()> {
        let failed: Vec<IndexingResult> = self.value.into_iter().filter(|r| !r.status).collect();
        let Some(first) = failed.first() else {
            return Ok(());
        };
        Err(RagError::upstream(
            SERVICE,
            format!(
                "{} document(s) failed to index, first {} (HTTP {}): {}",
                failed.len(),
                first.key,
                first.status_code.unwrap_or_default(),
                first.error_message.as_deref().unwrap_or("no error message")
            ),
        ))
    }
}

impl AzureSearchIndex {
    pub fn new(client: Client, config: AzureSearchConfig, dimensions: usize) -> Self {
        Self {
            client,
            config,
            dimensions,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/indexes/{}{}?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.index_name,
            path,
            self.config.api_version
        )
    }

    fn index_definition(&self) -> serde_json::Value {
        json!({
            "name": self.config.index_name,
            "fields": [
                { "name": "id", "type": "Edm.String", "key": true },
                { "name": "filename", "type": "Edm.String", "searchable": true, "filterable": true, "sortable": true },
                { "name": "content", "type": "Edm.String", "searchable": true },
                {
                    "name": "embedding",
                    "type": "Collection(Edm.Single)",
                    "searchable": true,
                    "retrievable": true,
                    "dimensions": self.dimensions,
                    "vectorSearchProfile": "default"
                }
            ],
            "vectorSearch": {
                "algorithms": [{ "name": "default", "kind": "hnsw" }],
                "profiles": [{ "name": "default", "algorithm": "default" }]
            }
        })
    }

    fn search_body(query_text: &str, query_vector: &[f32], top_k: usize) -> serde_json::Value {
        json!({
            "search": query_text,
            "vectorQueries": [{
                "kind": "vector",
                "vector": query_vector,
                "fields": "embedding",
                "k": K_NEAREST_NEIGHBORS
            }],
            "top": top_k,
            "select": "filename,content"
        })
    }
}

#[async_trait]
impl VectorIndex for AzureSearchIndex {
    async fn ensure_index(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url(""))
            .header("api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| RagError::upstream(SERVICE, e))?;

        if response.status() != StatusCode::NOT_FOUND {
            ensure_success(SERVICE, response).await?;
            log::debug!("Search index {} already exists", self.config.index_name);
            return Ok(());
        }

        let response = self
            .client
            .put(self.url(""))
            .header("api-key", &self.config.api_key)
            .json(&self.index_definition())
            .send()
            .await
            .map_err(|e| RagError::upstream(SERVICE, e))?;
        ensure_success(SERVICE, response).await?;

        log::info!("Created index: {}", self.config.index_name);
        Ok(())
    }

    async fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<()> {
        let value: Vec<UploadAction<'_>> = documents
            .iter()
            .map(|d| UploadAction {
                action: "upload",
                id: &d.id,
                filename: &d.source_name,
                content: &d.content,
                embedding: &d.embedding,
            })
            .collect();

        let response = self
            .client
            .post(self.url("/docs/index"))
            .header("api-key", &self.config.api_key)
            .json(&json!({ "value": value }))
            .send()
            .await
            .map_err(|e| RagError::upstream(SERVICE, e))?;

        let batch: IndexBatchResponse = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| RagError::upstream(SERVICE, e))?;
        if let Err(e) = batch.into_result() {
            log::warn!("Partial upload to {}: {}", self.config.index_name, e);
            return Err(e);
        }

        log::info!("Uploaded {} documents to {}", documents.len(), self.config.index_name);
        Ok(())
    }

    async fn search(
        &self,
        query_text: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let response = self
            .client
            .post(self.url("/docs/search"))
            .header("api-key", &self.config.api_key)
            .json(&Self::search_body(query_text, query_vector, top_k))
            .send()
            .await
            .map_err(|e| RagError::upstream(SERVICE, e))?;

        let body: SearchResponse = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| RagError::upstream(SERVICE, e))?;

        Ok(body
            .value
            .into_iter()
            .map(|hit| RetrievedChunk {
                source_name: hit.filename.unwrap_or_else(|| "Unknown Filename".to_string()),
                text: hit.content,
                score: hit.score,
            })
            .collect())
    }
}

/// Weight of the keyword-overlap fraction added to cosine similarity.
const KEYWORD_WEIGHT: f32 = 0.5;

/// Process-local index for development and tests. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    documents: RwLock<Vec<IndexedDocument>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn keyword_overlap(query_terms: &HashSet<String>, content: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let content_terms: HashSet<String> = tokenize(content).into_iter().collect();
    let matched = query_terms.intersection(&content_terms).count();
    matched as f32 / query_terms.len() as f32
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_index(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, documents: Vec<IndexedDocument>) -> Result<()> {
        let mut stored = self.documents.write().await;
        for document in documents {
            match stored.iter_mut().find(|d| d.id == document.id) {
                Some(existing) => *existing = document,
                None => stored.push(document),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        query_text: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let query_terms: HashSet<String> = tokenize(query_text).into_iter().collect();
        let documents = self.documents.read().await;

        let mut scored: Vec<RetrievedChunk> = documents
            .iter()
            .map(|d| RetrievedChunk {
                source_name: d.source_name.clone(),
                text: d.content.clone(),
                score: cosine_similarity(query_vector, &d.embedding)
                    + KEYWORD_WEIGHT * keyword_overlap(&query_terms, &d.content),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        log::debug!("Found {} relevant chunks", scored.len());
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding_service::HashingEmbeddings;

    fn doc(id: &str, source: &str, content: &str, embedder: &HashingEmbeddings) -> IndexedDocument {
        IndexedDocument {
            id: id.into(),
            source_name: source.into(),
            content: content.into(),
            embedding: embedder.embed_text(content),
        }
    }

    #[tokio::test]
    async fn memory_index_ranks_by_relevance() {
        let embedder = HashingEmbeddings::new(256);
        let index = InMemoryIndex::new();
        index
            .upsert(vec![
                doc("1", "weather.txt", "Tomorrow will be rainy and cold.", &embedder),
                doc("2", "banking.txt", "Open banking lets customers share account data.", &embedder),
                doc("3", "cooking.txt", "Simmer the sauce for twenty minutes.", &embedder),
            ])
            .await
            .unwrap();

        let question = "What is open banking?";
        let hits = index
            .search(question, &embedder.embed_text(question), 2)
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source_name, "banking.txt");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn memory_upsert_replaces_same_id() {
        let embedder = HashingEmbeddings::new(16);
        let index = InMemoryIndex::new();
        index.upsert(vec![doc("1", "a.txt", "first", &embedder)]).await.unwrap();
        index.upsert(vec![doc("1", "a.txt", "second", &embedder)]).await.unwrap();

        assert_eq!(index.len().await, 1);
        let hits = index.search("second", &embedder.embed_text("second"), 5).await.unwrap();
        assert_eq!(hits[0].text, "second");
    }

    fn azure_index() -> AzureSearchIndex {
        AzureSearchIndex::new(
            Client::new(),
            AzureSearchConfig {
                endpoint: "https://example.search.windows.net/".into(),
                api_key: "k".into(),
                index_name: "documents".into(),
                api_version: "2023-11-01".into(),
            },
            1536,
        )
    }

    #[test]
    fn azure_urls_and_index_schema() {
        let index = azure_index();
        assert_eq!(
            index.url("/docs/search"),
            "https://example.search.windows.net/indexes/documents/docs/search?api-version=2023-11-01"
        );

        let definition = index.index_definition();
        assert_eq!(definition["fields"][0]["key"], true);
        assert_eq!(definition["fields"][3]["dimensions"], 1536);
        assert_eq!(definition["vectorSearch"]["algorithms"][0]["kind"], "hnsw");
    }

    #[test]
    fn azure_search_body_is_hybrid() {
        let body = AzureSearchIndex::search_body("open banking", &[0.1, 0.2], 3);
        assert_eq!(body["search"], "open banking");
        assert_eq!(body["top"], 3);
        assert_eq!(body["vectorQueries"][0]["k"], K_NEAREST_NEIGHBORS);
        assert_eq!(body["select"], "filename,content");
    }

    #[test]
    fn azure_batch_with_a_failed_document_is_an_error() {
        let batch: IndexBatchResponse = serde_json::from_str(
            r#"{"value":[
                {"key":"1","status":true,"errorMessage":null,"statusCode":201},
                {"key":"2","status":false,"errorMessage":"vector dimension mismatch","statusCode":400}
            ]}"#,
        )
        .unwrap();

        let err = batch.into_result().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Upstream);
        assert!(err.to_string().contains("vector dimension mismatch"));
        assert!(err.to_string().contains("1 document(s) failed to index, first 2 (HTTP 400)"));
    }

    #[test]
    fn azure_batch_with_all_documents_indexed_is_ok() {
        let batch: IndexBatchResponse = serde_json::from_str(
            r#"{"value":[{"key":"1","status":true,"errorMessage":null,"statusCode":200}]}"#,
        )
        .unwrap();
        assert!(batch.into_result().is_ok());
    }

    #[test]
    fn azure_hits_fall_back_to_unknown_filename() {
        let body: SearchResponse = serde_json::from_str(
            r#"{"value":[{"@search.score":0.8,"content":"text"}]}"#,
        )
        .unwrap();
        assert!(body.value[0].filename.is_none());
        assert!((body.value[0].score - 0.8).abs() < f32::EPSILON);
    }
}
