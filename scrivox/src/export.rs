use std::path::Path;

use crate::error::{Error, Result};
use crate::text::segmentation::DisplayText;

pub const DEFAULT_EXPORT_FILENAME: &str = "extracted-text.txt";
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// A downloadable plain-text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextExport {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl TextExport {
    pub fn content_disposition(&self) -> String {
        format!(
            "attachment; filename=\"{}\"",
            self.filename.replace(['"', '\\'], "_")
        )
    }
}

pub fn export_text(text: &DisplayText, filename: Option<&str>) -> Result<TextExport> {
    if text.as_str().trim().is_empty() {
        return Err(Error::NoText);
    }
    Ok(TextExport {
        filename: export_filename(filename),
        content_type: TEXT_PLAIN,
        bytes: text.as_str().as_bytes().to_vec(),
    })
}

/// Keep only the last path component of a requested name.
fn export_filename(requested: Option<&str>) -> String {
    requested
        .map(|name| name.replace('\\', "/"))
        .and_then(|name| {
            Path::new(&name)
                .file_name()
                .and_then(|base| base.to_str())
                .map(str::trim)
                .filter(|base| !base.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_EXPORT_FILENAME.to_string())
}
