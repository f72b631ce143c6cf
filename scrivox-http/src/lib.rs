use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use scrivox::{
    export::export_text, extract_text, normalize, DisplayText, Error, Language, Paragraph,
    TextRecognizer,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

// Phone photos of a page are routinely larger than axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    recognizer: Arc<dyn TextRecognizer>,
}

#[derive(Serialize)]
struct UploadResponse {
    text: DisplayText,
    paragraphs: Vec<Paragraph>,
}

#[derive(Deserialize)]
struct ExportRequest {
    text: String,
    filename: Option<String>,
}

#[derive(Serialize)]
struct LanguageEntry {
    code: &'static str,
    name: &'static str,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::UpstreamFailure(detail) => {
                tracing::error!("OCR upstream failure: {detail}");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "OCR processing failed".to_string(),
                }
            }
            Error::NoText | Error::UnsupportedLanguage(_) => Self::bad_request(err.to_string()),
            other => {
                tracing::error!("request failed: {other}");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: other.to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

pub fn create_server(recognizer: Arc<dyn TextRecognizer>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(handle_upload))
        .route("/export", post(handle_export))
        .route("/languages", get(handle_languages))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { recognizer })
}

pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(listener, app.into_make_service()).await
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut image: Option<Vec<u8>> = None;
    let mut language = Language::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(err.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::bad_request(err.body_text()))?;
                image = Some(bytes.to_vec());
            }
            "language" => {
                let code = field
                    .text()
                    .await
                    .map_err(|err| ApiError::bad_request(err.body_text()))?;
                if !code.trim().is_empty() {
                    language = code.parse()?;
                }
            }
            other => tracing::debug!(field = other, "ignoring unknown upload field"),
        }
    }

    let image = image
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ApiError::bad_request("No image uploaded"))?;

    let text = extract_text(&state.recognizer, image, language).await?;
    let paragraphs = text.paragraphs();
    Ok(Json(UploadResponse { text, paragraphs }))
}

async fn handle_export(Json(request): Json<ExportRequest>) -> Result<Response, ApiError> {
    let text = normalize(&request.text);
    let export = export_text(&text, request.filename.as_deref()).map_err(|err| match err {
        Error::NoText => ApiError::bad_request("No text available to download."),
        other => other.into(),
    })?;

    let disposition = export.content_disposition();
    Ok((
        [
            (header::CONTENT_TYPE, export.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.bytes,
    )
        .into_response())
}

async fn handle_languages() -> Json<Vec<LanguageEntry>> {
    Json(
        Language::ALL
            .into_iter()
            .map(|language| LanguageEntry {
                code: language.code(),
                name: language.name(),
            })
            .collect(),
    )
}
