use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rag_engine::{ErrorKind, RagError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Rag(#[from] RagError),

    /// An extractor rejected the request before it reached the pipeline.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Rejected { status, .. } => *status,
            ApiError::Rag(err) => match err.kind() {
                ErrorKind::Input => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
                ErrorKind::Config | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            log::warn!("Request rejected with {}: {}", status, self);
            self.to_string()
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(err: axum::extract::rejection::JsonRejection) -> Self {
        ApiError::Rejected {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<axum::extract::multipart::MultipartRejection> for ApiError {
    fn from(err: axum::extract::multipart::MultipartRejection) -> Self {
        ApiError::Rejected {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        ApiError::Rejected {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
