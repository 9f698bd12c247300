//! HTTP surface: health check, segmentation endpoint and the upload page.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{errors::LunarSegError, traits::SegmentationModel, ui, Segmenter};

/// Multipart field that carries the uploaded image.
pub const UPLOAD_FIELD: &str = "file";

pub const GENERIC_FAILURE: &str = "Error during segmentation";

/// State shared by all handlers; the segmenter (and the model inside it) is
/// built once at startup and only read afterwards.
pub struct AppState<M: SegmentationModel> {
    pub segmenter: Arc<Segmenter<M>>,
}

impl<M: SegmentationModel> Clone for AppState<M> {
    fn clone(&self) -> Self {
        Self {
            segmenter: Arc::clone(&self.segmenter),
        }
    }
}

/// Error body in FastAPI's shape: `{"detail": "..."}`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: GENERIC_FAILURE.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Validation failures keep their message; anything else is logged here and
/// replaced by a generic detail.
impl From<LunarSegError> for ApiError {
    fn from(err: LunarSegError) -> Self {
        if err.is_client_error() {
            info!("rejected upload: {err}");
            Self::bad_request(err.to_string())
        } else {
            error!(error = ?err, "segmentation failed: {err}");
            Self::internal()
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        warn!("malformed multipart upload: {err}");
        Self {
            status: err.status(),
            detail: err.body_text(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
}

pub fn create_router<M: SegmentationModel + 'static>(
    segmenter: Arc<Segmenter<M>>,
    max_upload_bytes: usize,
) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/segment", post(segment::<M>))
        .route("/segment/", post(segment::<M>))
        .route("/ui", get(upload_page))
        .with_state(AppState { segmenter })
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<StatusMessage> {
    Json(StatusMessage {
        message: "Lunar Segmentation Server is running".to_string(),
    })
}

async fn upload_page() -> Html<&'static str> {
    Html(ui::INDEX_HTML)
}

async fn segment<M: SegmentationModel + 'static>(
    State(state): State<AppState<M>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = read_upload(&mut multipart).await?;
    info!(bytes = upload.len(), "received image for segmentation");

    let segmenter = Arc::clone(&state.segmenter);
    let png = tokio::task::spawn_blocking(move || segmenter.segment_bytes(&upload))
        .await
        .map_err(|e| {
            error!("segmentation task did not complete: {e}");
            ApiError::internal()
        })??;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn read_upload(multipart: &mut Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            return Ok(field.bytes().await?);
        }
    }
    Err(ApiError::bad_request(format!(
        "Missing multipart field `{UPLOAD_FIELD}` with the image to segment"
    )))
}

pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
        return;
    }
    info!("shutdown signal received");
}
