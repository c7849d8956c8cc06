use thiserror::Error;

pub mod config;
pub mod dispatch;
pub mod ingest;
pub mod note;
pub mod openai;
pub mod pipeline;
pub mod provider;
pub mod rate_limit;
pub mod schema;
pub mod source;

// Re-export for convenience
pub use config::{ApiKey, Config, ConfigError};
pub use dispatch::Dispatcher;
pub use ingest::{CleanupReport, IngestEvent, SourceStore, ingest, purge, release};
pub use note::{FieldProblem, NOTE_COUNT, NoteCollection, NoteField, NoteFieldError, StudyNote};
pub use openai::OpenAiClient;
pub use pipeline::{NotesPipeline, PipelineState};
pub use provider::{Citation, ModelProvider, ProviderError, QueryResult, ResponseRequest};
pub use schema::{NoteSchema, SchemaViolation, validate};
pub use source::DocumentRef;
pub use studynotes_pdf::PdfDocument;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("PDF error: {0}")]
    Pdf(#[from] studynotes_pdf::PdfError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("no source documents attached")]
    EmptySources,
    #[error("question is empty")]
    EmptyQuestion,
    #[error("malformed payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),
    #[error("schema violation: {0}")]
    SchemaViolation(SchemaViolation),
    #[error("expected exactly {expected} notes, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
    #[error("notes pipeline is {actual}, expected {expected}")]
    InvalidState {
        expected: PipelineState,
        actual: PipelineState,
    },
}

impl CoreError {
    /// Whether the error came from the shape of the model's output rather than
    /// from transport or input problems. Such failures may succeed on a
    /// regenerate.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            CoreError::MalformedPayload(_)
                | CoreError::SchemaViolation(_)
                | CoreError::CountMismatch { .. }
        )
    }

    /// Whether the error was caused by cancellation (Ctrl+C).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Provider(ProviderError::Cancelled))
    }
}
