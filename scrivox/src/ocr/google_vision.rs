use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use super::{Language, RecognizedText, TextRecognizer};
use crate::error::{Error, Result};

pub const VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
pub const API_KEY_ENV: &str = "GOOGLE_VISION_API_KEY";

// Upstream error bodies can be large HTML pages.
const MAX_ERROR_DETAIL: usize = 512;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateRequest<'a> {
    requests: [AnnotateImageRequest<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageRequest<'a> {
    image: ImageContent,
    features: [Feature<'a>; 1],
    image_context: ImageContext<'a>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageContext<'a> {
    language_hints: [&'a str; 1],
}

#[derive(Debug, Default, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    text_annotations: Vec<EntityAnnotation>,
    error: Option<RpcStatus>,
}

#[derive(Debug, Deserialize)]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct RpcStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// Google Cloud Vision `TEXT_DETECTION` over the REST API.
#[derive(Clone)]
pub struct GoogleVisionRecognizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GoogleVisionRecognizer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: VISION_ENDPOINT.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn annotate(&self, image: Vec<u8>, language: Language) -> Result<RecognizedText> {
        if image.is_empty() {
            return Err(Error::UpstreamFailure("empty image payload".into()));
        }

        let request = build_request(&image, language);
        tracing::debug!(endpoint = %self.endpoint, bytes = image.len(), %language, "sending image to vision api");

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut detail = response.text().await.unwrap_or_default();
            if detail.len() > MAX_ERROR_DETAIL {
                let mut cut = MAX_ERROR_DETAIL;
                while !detail.is_char_boundary(cut) {
                    cut -= 1;
                }
                detail.truncate(cut);
            }
            return Err(Error::UpstreamFailure(format!(
                "vision api returned {status}: {detail}"
            )));
        }

        let body: AnnotateResponse = response.json().await?;
        read_annotation(body)
    }
}

impl TextRecognizer for GoogleVisionRecognizer {
    fn recognize(&self, image: Vec<u8>, language: Language) -> BoxFuture<'_, Result<RecognizedText>> {
        self.annotate(image, language).boxed()
    }
}

fn build_request(image: &[u8], language: Language) -> AnnotateRequest<'static> {
    AnnotateRequest {
        requests: [AnnotateImageRequest {
            image: ImageContent {
                content: STANDARD.encode(image),
            },
            features: [Feature {
                kind: "TEXT_DETECTION",
            }],
            image_context: ImageContext {
                language_hints: [language.code()],
            },
        }],
    }
}

/// The first text annotation carries the whole page; the rest are single
/// words with bounding boxes, which we do not need.
fn read_annotation(body: AnnotateResponse) -> Result<RecognizedText> {
    let Some(first) = body.responses.into_iter().next() else {
        return Ok(RecognizedText::default());
    };
    if let Some(status) = first.error {
        return Err(Error::UpstreamFailure(format!(
            "vision api error {}: {}",
            status.code, status.message
        )));
    }
    Ok(first
        .text_annotations
        .into_iter()
        .next()
        .map(|annotation| RecognizedText::new(annotation.description))
        .unwrap_or_default())
}
