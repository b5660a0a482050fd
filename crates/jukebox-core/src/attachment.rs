//! Turning local files into message attachments
//!
//! The server only ever sees extracted text. How text is pulled out of a
//! given format is a [`TextExtractor`]; the built-in one handles plain text.

use std::path::Path;

use crate::error::ApiError;
use crate::state::AttachedFile;

/// "bytes → extracted text"
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, ApiError>;
}

/// Treats the file as UTF-8, replacing invalid sequences
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ApiError> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

impl AttachedFile {
    /// Read `path` and extract its text. The display name is the file name.
    pub async fn from_path(
        path: impl AsRef<Path>,
        extractor: &dyn TextExtractor,
    ) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            contents: extractor.extract(&bytes)?,
        })
    }
}
