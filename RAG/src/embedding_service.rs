//! Embedding gateways.
//!
//! Every provider turns one text into one fixed-length vector. Failures are
//! reported as [`RagError::Upstream`] and never retried here.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{AzureOpenAiConfig, GeminiConfig};
use crate::error::{RagError, Result};
use crate::http_client::ensure_success;
use crate::models::{GeminiContent, GeminiEmbedRequest, GeminiEmbedResponse, GeminiPart};

const SERVICE: &str = "embedding";

#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

pub struct AzureOpenAiEmbeddings {
    client: Client,
    url: String,
    api_key: String,
}

#[derive(Serialize)]
struct AzureEmbeddingRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct AzureEmbeddingResponse {
    data: Vec<AzureEmbeddingData>,
}

#[derive(Deserialize)]
struct AzureEmbeddingData {
    embedding: Vec<f32>,
}

impl AzureOpenAiEmbeddings {
    pub fn new(client: Client, config: &AzureOpenAiConfig) -> Self {
        let url = format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            config.endpoint.trim_end_matches('/'),
            config.deployment,
            config.api_version
        );
        Self {
            client,
            url,
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl EmbeddingGateway for AzureOpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&AzureEmbeddingRequest { input: text })
            .send()
            .await
            .map_err(|e| RagError::upstream(SERVICE, e))?;

        let body: AzureEmbeddingResponse = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| RagError::upstream(SERVICE, e))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RagError::upstream(SERVICE, "response contained no embedding"))
    }
}

pub struct GeminiEmbeddings {
    client: Client,
    url: String,
}

impl GeminiEmbeddings {
    pub fn new(client: Client, config: &GeminiConfig) -> Self {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:embedContent?key={}",
            config.model, config.api_key
        );
        Self { client, url }
    }
}

#[async_trait]
impl EmbeddingGateway for GeminiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = GeminiEmbedRequest {
            content: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            },
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::upstream(SERVICE, e))?;

        let body: GeminiEmbedResponse = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| RagError::upstream(SERVICE, e))?;

        Ok(body.embedding.values)
    }
}

/// Signed feature hashing over lower-cased words, L2-normalized.
///
/// Deterministic and offline. Texts sharing words land close together, which
/// is enough for local runs and tests; it has no notion of meaning.
#[derive(Debug, Clone)]
pub struct HashingEmbeddings {
    dimensions: usize,
}

impl HashingEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        let words = tokenize(text);
        if words.is_empty() {
            return embedding;
        }

        let total_words = words.len() as f32;
        for (word, count) in count_words(&words) {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let hash = hasher.finish();
            let idx = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[idx] += sign * count as f32 / total_words;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in embedding.iter_mut() {
                *value /= norm;
            }
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingGateway for HashingEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}

/// Lower-cased alphanumeric words longer than two characters.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|word| word.chars().count() > 2)
        .collect()
}

fn count_words(words: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for word in words {
        *counts.entry(word.as_str()).or_insert(0) += 1;
    }
    counts
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let min_len = a.len().min(b.len());

    let dot_product: f32 = a[..min_len]
        .iter()
        .zip(b[..min_len].iter())
        .map(|(x, y)| x * y)
        .sum();

    let norm_a: f32 = a[..min_len].iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b[..min_len].iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
