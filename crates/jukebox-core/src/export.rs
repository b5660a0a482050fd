//! Artifact download
//!
//! The artifact of a conversation is the `artifact` field of its last stored
//! message. Markdown export writes it out as-is; other formats go through a
//! registered [`DocumentConverter`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::api::ApiClient;
use crate::error::ApiError;

const FILE_STEM_CHARS: usize = 40;
const DEFAULT_STEM: &str = "artifact";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Docx,
    Pdf,
    Markdown,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Docx => "docx",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Markdown => "markdown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "docx" => Some(ExportFormat::Docx),
            "pdf" => Some(ExportFormat::Pdf),
            "markdown" | "md" => Some(ExportFormat::Markdown),
            _ => None,
        }
    }

    pub fn all() -> Vec<ExportFormat> {
        vec![ExportFormat::Docx, ExportFormat::Pdf, ExportFormat::Markdown]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ExportFormat::Docx => "Download as DOCX",
            ExportFormat::Pdf => "Download as PDF",
            ExportFormat::Markdown => "Download as Markdown",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Docx => "docx",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Markdown => "md",
        }
    }
}

/// "markdown text → document bytes"
pub trait DocumentConverter: Send + Sync {
    fn convert(&self, markdown: &str) -> Result<Vec<u8>, ApiError>;
}

/// Renders artifacts into the requested format
#[derive(Default)]
pub struct Exporter {
    converters: HashMap<ExportFormat, Box<dyn DocumentConverter>>,
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_converter(
        mut self,
        format: ExportFormat,
        converter: impl DocumentConverter + 'static,
    ) -> Self {
        self.converters.insert(format, Box::new(converter));
        self
    }

    pub fn supports(&self, format: ExportFormat) -> bool {
        format == ExportFormat::Markdown || self.converters.contains_key(&format)
    }

    pub fn render(&self, format: ExportFormat, artifact: &str) -> Result<Vec<u8>, ApiError> {
        if let Some(converter) = self.converters.get(&format) {
            return converter.convert(artifact);
        }
        match format {
            ExportFormat::Markdown => Ok(artifact.as_bytes().to_vec()),
            other => Err(ApiError::UnsupportedFormat(other.as_str().to_string())),
        }
    }
}

/// A rendered artifact ready to be written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDownload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ArtifactDownload {
    pub async fn save_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf, ApiError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.bytes).await?;
        Ok(path)
    }
}

/// Goal with spaces turned into dashes, lowercased, cut to 40 characters.
///
/// Path separators and other characters a file name cannot hold become
/// dashes, and leading or trailing dots and dashes are dropped, so the name
/// always stays inside the download directory.
pub fn artifact_file_name(goal: &str, format: ExportFormat) -> String {
    let cleaned: String = goal
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();

    let stem: String = cleaned
        .trim_matches(|c| c == '.' || c == '-')
        .chars()
        .take(FILE_STEM_CHARS)
        .collect();
    let stem = if stem.is_empty() { DEFAULT_STEM } else { stem.as_str() };

    format!("{}.{}", stem, format.extension())
}

/// Fetch a conversation's latest artifact and render it
pub async fn download_artifact(
    client: &ApiClient,
    conversation_id: &str,
    format: ExportFormat,
    exporter: &Exporter,
) -> Result<ArtifactDownload, ApiError> {
    let goal = client.get_conversation(conversation_id).await?.goal;
    let messages = client.list_messages(conversation_id).await?;

    let artifact = messages
        .last()
        .and_then(|m| m.artifact.as_deref())
        .ok_or(ApiError::NoArtifact)?;

    let bytes = exporter.render(format, artifact)?;
    info!(
        conversation = conversation_id,
        format = format.as_str(),
        size = bytes.len(),
        "artifact rendered"
    );

    Ok(ArtifactDownload {
        file_name: artifact_file_name(&goal, format),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stamp;

    impl DocumentConverter for Stamp {
        fn convert(&self, markdown: &str) -> Result<Vec<u8>, ApiError> {
            Ok(format!("DOCX[{}]", markdown).into_bytes())
        }
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            artifact_file_name("Create a Marketing Plan", ExportFormat::Markdown),
            "create-a-marketing-plan.md"
        );
    }

    #[test]
    fn test_file_name_truncates_stem() {
        let goal = "a".repeat(60);
        let name = artifact_file_name(&goal, ExportFormat::Docx);
        assert_eq!(name, format!("{}.docx", "a".repeat(40)));
    }

    #[test]
    fn test_file_name_replaces_path_separators() {
        assert_eq!(
            artifact_file_name("Compare A/B test results", ExportFormat::Markdown),
            "compare-a-b-test-results.md"
        );
        assert_eq!(
            artifact_file_name("C:\\temp\\notes", ExportFormat::Pdf),
            "c--temp-notes.pdf"
        );
    }

    #[test]
    fn test_file_name_cannot_climb_out_of_directory() {
        assert_eq!(
            artifact_file_name("../../escape", ExportFormat::Markdown),
            "escape.md"
        );
        assert_eq!(artifact_file_name("..", ExportFormat::Markdown), "artifact.md");
        assert_eq!(artifact_file_name("a\0b", ExportFormat::Markdown), "a-b.md");
    }

    #[test]
    fn test_file_name_falls_back_when_goal_is_empty() {
        assert_eq!(artifact_file_name("", ExportFormat::Docx), "artifact.docx");
        assert_eq!(artifact_file_name(" / ", ExportFormat::Docx), "artifact.docx");
    }

    #[tokio::test]
    async fn test_goal_with_slash_saves_inside_directory() {
        let dir = tempfile::tempdir().unwrap();
        let download = ArtifactDownload {
            file_name: artifact_file_name("Compare A/B test results", ExportFormat::Markdown),
            bytes: b"# AB".to_vec(),
        };

        let path = download.save_to(dir.path()).await.unwrap();
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# AB");
    }

    #[test]
    fn test_markdown_needs_no_converter() {
        let exporter = Exporter::new();
        assert!(exporter.supports(ExportFormat::Markdown));
        assert_eq!(
            exporter.render(ExportFormat::Markdown, "# Doc").unwrap(),
            b"# Doc".to_vec()
        );
    }

    #[test]
    fn test_unregistered_format_is_unsupported() {
        let exporter = Exporter::new();
        assert!(!exporter.supports(ExportFormat::Pdf));
        let err = exporter.render(ExportFormat::Pdf, "# Doc").unwrap_err();
        assert!(matches!(err, ApiError::UnsupportedFormat(f) if f == "pdf"));
    }

    #[test]
    fn test_registered_converter_is_used() {
        let exporter = Exporter::new().with_converter(ExportFormat::Docx, Stamp);
        assert!(exporter.supports(ExportFormat::Docx));
        assert_eq!(
            exporter.render(ExportFormat::Docx, "x").unwrap(),
            b"DOCX[x]".to_vec()
        );
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(ExportFormat::from_str("MD"), Some(ExportFormat::Markdown));
        assert_eq!(ExportFormat::from_str("docx"), Some(ExportFormat::Docx));
        assert_eq!(ExportFormat::from_str("odt"), None);
    }

    #[tokio::test]
    async fn test_save_to_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let download = ArtifactDownload {
            file_name: "plan.md".to_string(),
            bytes: b"# Plan".to_vec(),
        };

        let path = download.save_to(dir.path().join("out")).await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# Plan");
    }
}
