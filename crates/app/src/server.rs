use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pdf_index_core::{
    ensure_pdf_content_type, DocumentIndexer, EmbeddingGateway, IndexReport, IngestError,
    PdfExtractor, SearchCoordinator, SearchError, SearchQuery, SearchResult, VectorIndex,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, warn};

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub struct AppState {
    pub indexer: DocumentIndexer<dyn PdfExtractor, dyn VectorIndex>,
    pub search: SearchCoordinator<dyn VectorIndex>,
}

impl AppState {
    pub fn new(
        extractor: Arc<dyn PdfExtractor>,
        embeddings: Arc<EmbeddingGateway>,
        store: Arc<dyn VectorIndex>,
        collection: &str,
    ) -> Self {
        Self {
            indexer: DocumentIndexer::new(
                extractor,
                Arc::clone(&embeddings),
                Arc::clone(&store),
                collection,
            ),
            search: SearchCoordinator::new(embeddings, store, collection),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/index/pdf",
            post(index_pdf).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/search", post(search))
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(value: IngestError) -> Self {
        if value.is_client_error() {
            warn!(error = %value, "rejected upload");
            Self::bad_request(value.to_string())
        } else {
            error!(error = %value, "indexing failed");
            Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: value.to_string(),
            }
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(value: SearchError) -> Self {
        if value.is_client_error() {
            Self::bad_request(value.to_string())
        } else {
            error!(error = %value, "search failed");
            Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: value.to_string(),
            }
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Indexes the multipart field named `file`.
async fn index_pdf(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<IndexReport>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Multipart error: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload.pdf").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        ensure_pdf_content_type(&content_type)?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

        let report = state
            .indexer
            .index_upload(bytes, &filename, &content_type)
            .await?;
        return Ok(Json(report));
    }

    Err(ApiError::bad_request("No file provided"))
}

async fn search(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SearchQuery>, JsonRejection>,
) -> Result<Json<SearchResult>, ApiError> {
    let Json(query) = payload.map_err(|rejection| ApiError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        detail: rejection.body_text(),
    })?;

    Ok(Json(state.search.search(&query).await?))
}
