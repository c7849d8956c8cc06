use thiserror::Error;

pub mod export;
pub mod types;

pub use export::{render, summarize, to_json, to_markdown, write_notes};
pub use types::{CollectionSummary, ExportFormat, WrittenFiles};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("could not serialize notes: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("could not write {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
