use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use rag_engine::{RagError, DEFAULT_SESSION};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

use crate::app_state::AppState;
use crate::chat_payload::ChatPayload;
use crate::chat_response::ChatResponse;
use crate::error::{ApiError, ApiResult};
use crate::server_config::ServerConfig;
use crate::upload_response::{UploadResponse, UPLOAD_SUCCESS_MESSAGE};

pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/docs/upload", post(upload_document))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatPayload>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let Json(payload) = payload?;
    let session_id = payload
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());

    log::info!("Chat request for session {}", session_id);
    let answer = state.rag.query.ask(&session_id, &payload.question).await?;

    Ok(Json(ChatResponse {
        answer: answer.answer,
        session_id,
        sources: answer.sources,
        token_usage: answer.token_usage,
    }))
}

async fn upload_document(
    State(state): State<AppState>,
    multipart: Result<Multipart, axum::extract::multipart::MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        if field.name().is_some_and(|name| name != "file") {
            continue;
        }

        let bytes = field.bytes().await?;
        log::info!("Received upload {} ({} bytes)", filename, bytes.len());

        let report = state.rag.ingestion.ingest(&filename, bytes.to_vec()).await?;
        return Ok(Json(UploadResponse {
            message: UPLOAD_SUCCESS_MESSAGE.to_string(),
            source_name: report.source_name,
            chunk_count: report.chunk_count,
        }));
    }

    Err(ApiError::from(RagError::input("No file uploaded")))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.rag.sessions.len().await,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use rag_engine::config::{CompletionProvider, EmbeddingProvider, VectorIndexProvider};
    use rag_engine::*;
    use tower::ServiceExt;

    use super::*;

    struct EchoCompletion;

    #[async_trait]
    impl CompletionGateway for EchoCompletion {
        async fn complete(&self, messages: &[Message]) -> Result<Completion> {
            Ok(Completion {
                answer: format!("received {} messages", messages.len()),
                token_usage: 7,
            })
        }
    }

    fn app() -> Router {
        app_with(ServerConfig::default())
    }

    fn app_with(server: ServerConfig) -> Router {
        let config = RagConfig {
            embedding_provider: EmbeddingProvider::Hashing,
            completion_provider: CompletionProvider::AzureOpenAi,
            vector_index_provider: VectorIndexProvider::Memory,
            azure_embedding: None,
            azure_chat: None,
            gemini_embedding: None,
            gemini_chat: None,
            azure_search: None,
            embedding_dimensions: 64,
            chunk_size: 500,
            chunk_size_unit: SizeUnit::Chars,
            top_k: 3,
            embedding_concurrency: 1,
            history: HistoryLimit::default(),
            session_ttl: Duration::from_secs(3600),
            max_sessions: 10,
            http_timeout: Duration::from_secs(5),
        };
        let gateways = Gateways {
            embeddings: Arc::new(HashingEmbeddings::new(64)),
            index: Arc::new(InMemoryIndex::new()),
            completion: Arc::new(EchoCompletion),
        };
        let rag = RagSystem::with_gateways(&config, gateways).unwrap();
        router(AppState::new(rag), &server)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn chat_request(body: Value) -> Request<Body> {
        Request::post("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn upload_request(filename: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--BOUNDARY\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             {content}\r\n\
             --BOUNDARY--\r\n"
        );
        Request::post("/docs/upload")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=BOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn chat_returns_answer_for_default_session() {
        let response = app()
            .oneshot(chat_request(json!({ "question": "What is open banking?" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["answer"], "received 2 messages");
        assert_eq!(body["session_id"], DEFAULT_SESSION);
        assert_eq!(body["token_usage"], 7);
    }

    #[tokio::test]
    async fn chat_continues_named_session() {
        let app = app();
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(chat_request(json!({ "question": "Again?", "session_id": "abc" })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(chat_request(json!({ "question": "Third?", "session_id": "abc" })))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["answer"], "received 6 messages");
    }

    #[tokio::test]
    async fn blank_question_is_a_bad_request() {
        let response = app()
            .oneshot(chat_request(json!({ "question": "  " })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let response = app()
            .oneshot(chat_request(json!({ "prompt": "wrong field" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_indexes_text_file() {
        let response = app()
            .oneshot(upload_request(
                "notes.txt",
                "Open banking lets customers share data. Providers need consent.",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], UPLOAD_SUCCESS_MESSAGE);
        assert_eq!(body["source_name"], "notes.txt");
        assert_eq!(body["chunk_count"], 1);
    }

    #[tokio::test]
    async fn upload_rejects_unsupported_type() {
        let response = app()
            .oneshot(upload_request("contract.docx", "binary"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("Unsupported file type"));
    }

    #[tokio::test]
    async fn upload_over_the_size_limit_is_payload_too_large() {
        let app = app_with(ServerConfig {
            max_upload_bytes: 256,
            ..ServerConfig::default()
        });
        let content = "Open banking lets customers share data. ".repeat(20);

        let response = app.oneshot(upload_request("big.txt", &content)).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn upload_without_multipart_is_a_bad_request() {
        let request = Request::post("/docs/upload")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_live_sessions() {
        let app = app();
        app.clone()
            .oneshot(chat_request(json!({ "question": "Hi?", "session_id": "s1" })))
            .await
            .unwrap();

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 1);
    }
}
