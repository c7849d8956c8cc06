//! The boundary between the dispatcher and the remote model.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Errors raised by the remote provider or the transport to it.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error(
        "rate limited (429){}",
        .retry_after.map(|d| format!(", retry after {:.1}s", d.as_secs_f64())).unwrap_or_default()
    )]
    RateLimited { retry_after: Option<Duration> },
    #[error("no response after {:.1}s", .after.as_secs_f64())]
    Timeout { after: Duration },
    #[error("request cancelled")]
    Cancelled,
    #[error("model refused the request: {0}")]
    Refused(String),
    #[error("response incomplete: {0}")]
    Incomplete(String),
    #[error("response failed: {0}")]
    Failed(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("indexing failed for {failed} of {total} file(s) in vector store {vector_store_id}")]
    IndexingFailed {
        vector_store_id: String,
        failed: u32,
        total: u32,
    },
}

/// Structured-output constraint attached to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

/// One request to the model: instructions, user input, and the vector stores
/// file search is restricted to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRequest {
    pub model: String,
    pub instructions: String,
    pub input: String,
    pub vector_store_ids: Vec<String>,
    pub output_schema: Option<OutputSchema>,
    pub temperature: Option<f32>,
}

/// A file citation marker attached to a span of the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub file_id: String,
    pub filename: Option<String>,
    /// Character offset of the marker in the answer text.
    pub index: Option<usize>,
}

/// Raw model output: free text (possibly JSON) plus citation markers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryResult {
    pub response_id: Option<String>,
    pub text: String,
    pub citations: Vec<Citation>,
}

impl QueryResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn has_citations(&self) -> bool {
        !self.citations.is_empty()
    }
}

/// A remote model that can answer a [`ResponseRequest`].
///
/// Implemented by [`OpenAiClient`](crate::OpenAiClient); tests substitute
/// scripted providers.
pub trait ModelProvider {
    fn respond(
        &self,
        request: &ResponseRequest,
    ) -> impl Future<Output = Result<QueryResult, ProviderError>> + Send;
}
