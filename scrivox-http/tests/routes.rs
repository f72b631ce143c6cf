use std::sync::{Arc, Mutex};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use scrivox::{Error, Language, RecognizedText, TextRecognizer};
use tower::ServiceExt;

const BOUNDARY: &str = "scrivox-test-boundary";

struct FakeRecognizer {
    reply: Result<&'static str, &'static str>,
    seen: Mutex<Vec<(usize, Language)>>,
}

impl FakeRecognizer {
    fn new(reply: Result<&'static str, &'static str>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl TextRecognizer for FakeRecognizer {
    fn recognize(
        &self,
        image: Vec<u8>,
        language: Language,
    ) -> BoxFuture<'_, scrivox::Result<RecognizedText>> {
        self.seen.lock().unwrap().push((image.len(), language));
        let reply = self
            .reply
            .map(RecognizedText::new)
            .map_err(|detail| Error::UpstreamFailure(detail.to_string()));
        async move { reply }.boxed()
    }
}

fn app(recognizer: Arc<FakeRecognizer>) -> Router {
    scrivox_http::create_server(recognizer)
}

fn upload_request(image: Option<&[u8]>, language: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(bytes) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"scan.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(code) = language {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"language\"\r\n\r\n{code}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn upload_returns_paragraphs() {
    let recognizer = FakeRecognizer::new(Ok("Dear diary,\n\n\n\nToday it rained.\n  \nThe end"));
    let response = app(recognizer.clone())
        .oneshot(upload_request(Some(b"\x89PNG fake"), Some("de")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(
        body["text"],
        "Dear diary,\n\nToday it rained.\n\nThe end"
    );
    assert_eq!(
        body["paragraphs"],
        serde_json::json!(["Dear diary,", "Today it rained.", "The end"])
    );
    assert_eq!(*recognizer.seen.lock().unwrap(), vec![(9, Language::De)]);
}

#[tokio::test]
async fn upload_defaults_to_english() {
    let recognizer = FakeRecognizer::new(Ok("hello"));
    let response = app(recognizer.clone())
        .oneshot(upload_request(Some(b"img"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(recognizer.seen.lock().unwrap()[0].1, Language::En);
}

#[tokio::test]
async fn upload_with_nothing_detected_is_empty_text() {
    let response = app(FakeRecognizer::new(Ok("   ")))
        .oneshot(upload_request(Some(b"img"), Some("en")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["text"], "");
    assert_eq!(body["paragraphs"], serde_json::json!([]));
}

#[tokio::test]
async fn upload_without_image_is_bad_request() {
    let recognizer = FakeRecognizer::new(Ok("unused"));
    let response = app(recognizer.clone())
        .oneshot(upload_request(None, Some("en")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "No image uploaded");
    assert!(recognizer.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn upload_with_unsupported_language_is_bad_request() {
    let response = app(FakeRecognizer::new(Ok("unused")))
        .oneshot(upload_request(Some(b"img"), Some("pt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upstream_failure_is_generic_server_error() {
    let response = app(FakeRecognizer::new(Err("permission denied for project 1234")))
        .oneshot(upload_request(Some(b"img"), Some("en")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "error": "OCR processing failed" })
    );
}

#[tokio::test]
async fn export_returns_plain_text_attachment() {
    let request = Request::builder()
        .method("POST")
        .uri("/export")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "text": "one\n\n\n\ntwo", "filename": "../notes.txt" }).to_string(),
        ))
        .unwrap();
    let response = app(FakeRecognizer::new(Ok(""))).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"notes.txt\""
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"one\n\ntwo");
}

#[tokio::test]
async fn export_of_blank_text_is_rejected() {
    let request = Request::builder()
        .method("POST")
        .uri("/export")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"text":"  \n "}"#))
        .unwrap();
    let response = app(FakeRecognizer::new(Ok(""))).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["error"],
        "No text available to download."
    );
}

#[tokio::test]
async fn languages_lists_supported_hints() {
    let request = Request::builder()
        .uri("/languages")
        .body(Body::empty())
        .unwrap();
    let response = app(FakeRecognizer::new(Ok(""))).oneshot(request).await.unwrap();
    let body = json_body(response).await;
    let codes: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["code"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(codes, ["en", "es", "fr", "de", "it"]);
}
