use std::path::PathBuf;

/// Output representations of a note collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 2] = [ExportFormat::Json, ExportFormat::Markdown];

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
        }
    }

    /// File name used by [`crate::write_notes`].
    pub fn file_name(self) -> &'static str {
        match self {
            ExportFormat::Json => "notes.json",
            ExportFormat::Markdown => "notes.md",
        }
    }
}

/// Headline numbers for a collection, shown before the notes themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectionSummary {
    pub total: usize,
    pub with_source_reference: usize,
    /// Mean summary length in characters.
    pub average_summary_chars: f64,
}

/// Where [`crate::write_notes`] put its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    pub json: PathBuf,
    pub markdown: PathBuf,
}
