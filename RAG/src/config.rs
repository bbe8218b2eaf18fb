//! Environment-driven configuration.
//!
//! Provider credentials are only required for the providers that are selected,
//! so a local setup can run with `EMBEDDING_PROVIDER=hashing` and
//! `VECTOR_INDEX_PROVIDER=memory` and only a completion key.

use std::str::FromStr;
use std::time::Duration;

use crate::context::HistoryLimit;
use crate::error::{RagError, Result};
use crate::tokenizer::SizeUnit;

pub const DEFAULT_AZURE_OPENAI_API_VERSION: &str = "2024-02-01";
pub const DEFAULT_AI_SEARCH_API_VERSION: &str = "2023-11-01";
pub const DEFAULT_GEMINI_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_EMBEDDING_MODEL: &str = "text-embedding-004";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    AzureOpenAi,
    Gemini,
    /// Local feature-hashing embedder, no network calls.
    Hashing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionProvider {
    AzureOpenAi,
    Gemini,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorIndexProvider {
    AzureSearch,
    Memory,
}

impl FromStr for EmbeddingProvider {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure_openai" | "azure" => Ok(Self::AzureOpenAi),
            "gemini" => Ok(Self::Gemini),
            "hashing" | "local" => Ok(Self::Hashing),
            other => Err(RagError::Config(format!("unknown embedding provider '{other}'"))),
        }
    }
}

impl FromStr for CompletionProvider {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure_openai" | "azure" => Ok(Self::AzureOpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(RagError::Config(format!("unknown completion provider '{other}'"))),
        }
    }
}

impl FromStr for VectorIndexProvider {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure_search" | "azure" => Ok(Self::AzureSearch),
            "memory" | "in_memory" => Ok(Self::Memory),
            other => Err(RagError::Config(format!("unknown vector index provider '{other}'"))),
        }
    }
}

/// One Azure OpenAI deployment (embedding or chat).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureOpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub deployment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureSearchConfig {
    pub endpoint: String,
    pub api_key: String,
    pub index_name: String,
    pub api_version: String,
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub embedding_provider: EmbeddingProvider,
    pub completion_provider: CompletionProvider,
    pub vector_index_provider: VectorIndexProvider,

    pub azure_embedding: Option<AzureOpenAiConfig>,
    pub azure_chat: Option<AzureOpenAiConfig>,
    pub gemini_embedding: Option<GeminiConfig>,
    pub gemini_chat: Option<GeminiConfig>,
    pub azure_search: Option<AzureSearchConfig>,

    pub embedding_dimensions: usize,
    pub chunk_size: usize,
    pub chunk_size_unit: SizeUnit,
    pub top_k: usize,
    pub embedding_concurrency: usize,
    pub history: HistoryLimit,
    pub session_ttl: Duration,
    pub max_sessions: usize,
    pub http_timeout: Duration,
}

impl RagConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let embedding_provider: EmbeddingProvider = env.parse_or("EMBEDDING_PROVIDER", EmbeddingProvider::AzureOpenAi)?;
        let completion_provider: CompletionProvider = env.parse_or("COMPLETION_PROVIDER", CompletionProvider::AzureOpenAi)?;
        let vector_index_provider: VectorIndexProvider =
            env.parse_or("VECTOR_INDEX_PROVIDER", VectorIndexProvider::AzureSearch)?;

        let azure_embedding = match embedding_provider {
            EmbeddingProvider::AzureOpenAi => Some(env.azure_openai("AZURE_OPENAI_EMBEDDING_DEPLOYMENT")?),
            _ => None,
        };
        let azure_chat = match completion_provider {
            CompletionProvider::AzureOpenAi => Some(env.azure_openai("AZURE_OPENAI_API_DEPLOYMENT")?),
            _ => None,
        };
        let gemini_embedding = match embedding_provider {
            EmbeddingProvider::Gemini => Some(GeminiConfig {
                api_key: env.required("GEMINI_API_KEY")?,
                model: env.or("GEMINI_EMBEDDING_MODEL", DEFAULT_GEMINI_EMBEDDING_MODEL),
            }),
            _ => None,
        };
        let gemini_chat = match completion_provider {
            CompletionProvider::Gemini => Some(GeminiConfig {
                api_key: env.required("GEMINI_API_KEY")?,
                model: env.or("GEMINI_CHAT_MODEL", DEFAULT_GEMINI_CHAT_MODEL),
            }),
            _ => None,
        };
        let azure_search = match vector_index_provider {
            VectorIndexProvider::AzureSearch => Some(AzureSearchConfig {
                endpoint: env.required("AI_SEARCH_ENDPOINT")?,
                api_key: env.required("AI_SEARCH_API_KEY")?,
                index_name: env.required("AI_SEARCH_INDEX_NAME")?,
                api_version: env.or("AI_SEARCH_API_VERSION", DEFAULT_AI_SEARCH_API_VERSION),
            }),
            VectorIndexProvider::Memory => None,
        };

        let config = Self {
            embedding_provider,
            completion_provider,
            vector_index_provider,
            azure_embedding,
            azure_chat,
            gemini_embedding,
            gemini_chat,
            azure_search,
            embedding_dimensions: env.parse_or("EMBEDDING_DIMENSIONS", 1536)?,
            chunk_size: env.parse_or("CHUNK_SIZE", 500)?,
            chunk_size_unit: env.parse_or("CHUNK_SIZE_UNIT", SizeUnit::Chars)?,
            top_k: env.parse_or("TOP_K", 3)?,
            embedding_concurrency: env.parse_or("EMBEDDING_CONCURRENCY", 1)?,
            history: HistoryLimit {
                max_messages: env.parse_or("HISTORY_MAX_MESSAGES", 20)?,
                max_tokens: env.parse_opt("HISTORY_MAX_TOKENS")?,
            },
            session_ttl: Duration::from_secs(env.parse_or("SESSION_TTL_SECS", 3600)?),
            max_sessions: env.parse_or("MAX_SESSIONS", 1000)?,
            http_timeout: Duration::from_secs(env.parse_or("HTTP_TIMEOUT_SECS", 60)?),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("CHUNK_SIZE", self.chunk_size),
            ("TOP_K", self.top_k),
            ("EMBEDDING_CONCURRENCY", self.embedding_concurrency),
            ("EMBEDDING_DIMENSIONS", self.embedding_dimensions),
            ("MAX_SESSIONS", self.max_sessions),
        ] {
            if value == 0 {
                return Err(RagError::Config(format!("{key} must be greater than zero")));
            }
        }
        if self.session_ttl.is_zero() {
            return Err(RagError::Config(
                "SESSION_TTL_SECS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| RagError::Config(format!("{key} environment variable not set")))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_opt<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| RagError::Config(format!("{key}='{raw}' is invalid: {e}")))
            })
            .transpose()
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse_opt(key)?.unwrap_or(default))
    }

    fn azure_openai(&self, deployment_key: &str) -> Result<AzureOpenAiConfig> {
        Ok(AzureOpenAiConfig {
            endpoint: self.required("AZURE_OPENAI_ENDPOINT")?,
            api_key: self.required("AZURE_OPENAI_API_KEY")?,
            api_version: self.or("OPENAI_API_VERSION", DEFAULT_AZURE_OPENAI_API_VERSION),
            deployment: self.required(deployment_key)?,
        })
    }
}
