//! Document loading for file and batch jobs.

use std::path::Path;

use crate::error::SummarizeError;

/// Extensions the loader can read as text.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".txt", ".md"];

/// A loaded document.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: String,
    pub file_name: String,
    pub extension: String,
    pub size: u64,
    pub content: String,
}

/// Lowercased extension with a leading dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Whether `path` has one of the `supported` extensions.
pub fn is_supported(path: &Path, supported: &[String]) -> bool {
    let ext = extension_of(path);
    !ext.is_empty() && supported.iter().any(|s| s.eq_ignore_ascii_case(&ext))
}

/// Read a document as UTF-8, replacing invalid sequences.
pub async fn load_document(path: &Path) -> Result<Document, SummarizeError> {
    let extension = extension_of(path);
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(SummarizeError::UnsupportedFileType { extension });
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SummarizeError::DocumentRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    Ok(Document {
        path: path.display().to_string(),
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        extension,
        size: bytes.len() as u64,
        content: String::from_utf8_lossy(&bytes).into_owned(),
    })
}
