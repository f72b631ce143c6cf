pub mod error;
pub mod export;
pub mod ocr;
pub mod speech;
pub mod text;

// Re-export key functionality for easy access
pub use error::{Error, Result};
pub use ocr::{extract_text, GoogleVisionRecognizer, Language, RecognizedText, TextRecognizer};
pub use speech::controller::{PlaybackController, PlaybackState};
pub use text::segmentation::{normalize, render, segment, DisplayText, Paragraph};
