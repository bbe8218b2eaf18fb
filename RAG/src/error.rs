//! Error type shared by every stage of the RAG pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    NotFound,
    Upstream,
    Config,
    Internal,
}

#[derive(Debug, Error)]
pub enum RagError {
    /// The caller sent something we cannot process (bad file type, blank question, ...).
    #[error("{0}")]
    Input(String),

    /// A local file could not be opened.
    #[error("the file '{}' was not found: {source}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An embedding, vector index or completion call failed.
    #[error("{service} request failed: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    pub fn input(message: impl Into<String>) -> Self {
        RagError::Input(message.into())
    }

    pub fn upstream(service: &'static str, message: impl ToString) -> Self {
        RagError::Upstream {
            service,
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Input(_) => ErrorKind::Input,
            RagError::NotFound { .. } => ErrorKind::NotFound,
            RagError::Upstream { .. } => ErrorKind::Upstream,
            RagError::Config(_) => ErrorKind::Config,
            RagError::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_the_file() {
        let err = RagError::NotFound {
            path: PathBuf::from("input_docs/open-banking.pdf"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("input_docs/open-banking.pdf"));
    }

    #[test]
    fn upstream_carries_service_name() {
        let err = RagError::upstream("embedding", "401 Unauthorized");
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.to_string(), "embedding request failed: 401 Unauthorized");
    }
}
