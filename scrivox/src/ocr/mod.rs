//! Image-to-text collaborator.
//!
//! The recognizer is an external service. We only hand it image bytes and a
//! language hint and take back the full-page text.

pub mod google_vision;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::text::segmentation::{normalize, DisplayText};

pub use google_vision::GoogleVisionRecognizer;

/// Language hints accepted for recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
    Fr,
    De,
    It,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::En,
        Language::Es,
        Language::Fr,
        Language::De,
        Language::It,
    ];

    /// ISO-639-1 code
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::Fr => "fr",
            Language::De => "de",
            Language::It => "it",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Es => "Spanish",
            Language::Fr => "French",
            Language::De => "German",
            Language::It => "Italian",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_lowercase();
        Language::ALL
            .into_iter()
            .find(|language| language.code() == code)
            .ok_or_else(|| Error::UnsupportedLanguage(s.to_string()))
    }
}

/// Text exactly as the recognizer returned it. Empty when nothing was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognizedText(String);

impl RecognizedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: Vec<u8>, language: Language) -> BoxFuture<'_, Result<RecognizedText>>;
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for Arc<T> {
    fn recognize(&self, image: Vec<u8>, language: Language) -> BoxFuture<'_, Result<RecognizedText>> {
        (**self).recognize(image, language)
    }
}

/// Recognize `image` and rebuild its paragraphs.
///
/// Finding no text is not an error here; the result is simply empty.
pub async fn extract_text<R>(recognizer: &R, image: Vec<u8>, language: Language) -> Result<DisplayText>
where
    R: TextRecognizer + ?Sized,
{
    let bytes = image.len();
    let recognized = recognizer.recognize(image, language).await?;
    let text = normalize(recognized.as_str());
    tracing::info!(
        bytes,
        %language,
        paragraphs = text.paragraphs().len(),
        "image recognized"
    );
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    struct Canned(std::result::Result<&'static str, &'static str>);

    impl TextRecognizer for Canned {
        fn recognize(&self, _image: Vec<u8>, _language: Language) -> BoxFuture<'_, Result<RecognizedText>> {
            let outcome = self
                .0
                .map(RecognizedText::new)
                .map_err(|detail| Error::UpstreamFailure(detail.to_string()));
            async move { outcome }.boxed()
        }
    }

    #[test]
    fn test_language_codes() {
        assert_eq!("de".parse::<Language>().unwrap(), Language::De);
        assert_eq!(" IT ".parse::<Language>().unwrap(), Language::It);
        assert!(matches!(
            "pt".parse::<Language>(),
            Err(Error::UnsupportedLanguage(code)) if code == "pt"
        ));
        assert_eq!(Language::default().code(), "en");
        assert_eq!(serde_json::to_string(&Language::Fr).unwrap(), "\"fr\"");
    }

    #[tokio::test]
    async fn test_extract_text_normalizes_paragraphs() {
        let recognizer = Canned(Ok("  Shopping list\n\n\n\nmilk\neggs\n \n"));
        let text = extract_text(&recognizer, vec![1, 2, 3], Language::En)
            .await
            .unwrap();
        assert_eq!(text.as_str(), "Shopping list\n\nmilk\neggs");
    }

    #[tokio::test]
    async fn test_extract_text_with_nothing_found() {
        let recognizer = Canned(Ok(""));
        let text = extract_text(&recognizer, vec![1], Language::Es).await.unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_extract_text_propagates_upstream_failure() {
        let recognizer: Arc<dyn TextRecognizer> = Arc::new(Canned(Err("quota exceeded")));
        let err = extract_text(&recognizer, vec![1], Language::En)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
