//! Query dispatch: compose a request, send it, return the raw result.
//!
//! Each call is a single awaited round trip. No state is kept between calls.

use tokio_util::sync::CancellationToken;

use crate::CoreError;
use crate::config::Config;
use crate::provider::{ModelProvider, ProviderError, QueryResult, ResponseRequest};
use crate::schema::NoteSchema;
use crate::source::{DocumentRef, filename_for, vector_store_ids};

const QA_INSTRUCTIONS: &str = "You are a helpful tutor. Use the knowledge in the attached files \
    to answer questions. Cite sources where possible.";

const NOTES_INSTRUCTIONS: &str = "You are a study summarizer. Use only the attached files. \
    Return exactly the requested number of unique notes that will help prepare for the exam, \
    and respond only with JSON matching the given schema.";

/// Sends questions and notes-generation requests to a [`ModelProvider`].
pub struct Dispatcher<P> {
    provider: P,
    model: String,
    temperature: Option<f32>,
    cancel: CancellationToken,
}

impl<P: ModelProvider + Sync> Dispatcher<P> {
    pub fn new(provider: P, config: &Config) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            temperature: config.temperature,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort in-flight and future calls when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Ask a question, restricting file search to `sources`.
    ///
    /// Citations the provider returns without a filename are named from the
    /// matching source.
    pub async fn ask(
        &self,
        question: &str,
        sources: &[DocumentRef],
    ) -> Result<QueryResult, CoreError> {
        if sources.is_empty() {
            return Err(CoreError::EmptySources);
        }
        let question = question.trim();
        if question.is_empty() {
            return Err(CoreError::EmptyQuestion);
        }

        let request = ResponseRequest {
            model: self.model.clone(),
            instructions: QA_INSTRUCTIONS.to_string(),
            input: question.to_string(),
            vector_store_ids: vector_store_ids(sources),
            output_schema: None,
            temperature: self.temperature,
        };

        let mut result = self.submit(&request).await?;
        for citation in &mut result.citations {
            if citation.filename.is_none() {
                citation.filename = filename_for(sources, &citation.file_id).map(str::to_string);
            }
        }
        Ok(result)
    }

    /// Ask for exactly ten notes conforming to `schema`.
    pub async fn generate_notes(
        &self,
        sources: &[DocumentRef],
        schema: &NoteSchema,
    ) -> Result<QueryResult, CoreError> {
        if sources.is_empty() {
            return Err(CoreError::EmptySources);
        }

        let request = ResponseRequest {
            model: self.model.clone(),
            instructions: NOTES_INSTRUCTIONS.to_string(),
            input: schema.prompt(),
            vector_store_ids: vector_store_ids(sources),
            output_schema: Some(schema.output_schema()),
            temperature: self.temperature,
        };

        self.submit(&request).await
    }

    async fn submit(&self, request: &ResponseRequest) -> Result<QueryResult, CoreError> {
        if self.cancel.is_cancelled() {
            return Err(ProviderError::Cancelled.into());
        }

        log::debug!(
            "dispatching request to {} ({} vector store(s), structured: {})",
            request.model,
            request.vector_store_ids.len(),
            request.output_schema.is_some()
        );

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProviderError::Cancelled),
            result = self.provider.respond(request) => result,
        }?;

        log::debug!(
            "received {} chars with {} citation(s)",
            result.text.len(),
            result.citations.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Citation;
    use std::sync::Mutex;

    /// Records every request and answers with a fixed result.
    struct RecordingProvider {
        reply: QueryResult,
        requests: Mutex<Vec<ResponseRequest>>,
    }

    impl RecordingProvider {
        fn new(reply: QueryResult) -> Self {
            Self {
                reply,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ResponseRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl ModelProvider for RecordingProvider {
        async fn respond(&self, request: &ResponseRequest) -> Result<QueryResult, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }
    }

    /// Never answers.
    struct HangingProvider;

    impl ModelProvider for HangingProvider {
        async fn respond(&self, _request: &ResponseRequest) -> Result<QueryResult, ProviderError> {
            std::future::pending().await
        }
    }

    fn sources() -> Vec<DocumentRef> {
        vec![
            DocumentRef {
                file_id: "file-1".into(),
                filename: "biology.pdf".into(),
                vector_store_id: "vs_1".into(),
            },
            DocumentRef {
                file_id: "file-2".into(),
                filename: "chemistry.pdf".into(),
                vector_store_id: "vs_1".into(),
            },
        ]
    }

    fn config() -> Config {
        Config::with_api_key("sk-test")
    }

    #[tokio::test]
    async fn ask_builds_file_search_request() {
        let dispatcher = Dispatcher::new(RecordingProvider::new(QueryResult::new("answer")), &config());
        let result = dispatcher.ask("  What is mitosis? ", &sources()).await.unwrap();
        assert_eq!(result.text, "answer");

        let requests = dispatcher.provider().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].input, "What is mitosis?");
        assert_eq!(requests[0].vector_store_ids, vec!["vs_1"]);
        assert_eq!(requests[0].model, "gpt-4o-mini");
        assert!(requests[0].output_schema.is_none());
    }

    #[tokio::test]
    async fn ask_fills_missing_citation_names() {
        let mut reply = QueryResult::new("answer");
        reply.citations = vec![
            Citation {
                file_id: "file-2".into(),
                filename: None,
                index: Some(3),
            },
            Citation {
                file_id: "file-9".into(),
                filename: None,
                index: None,
            },
        ];
        let dispatcher = Dispatcher::new(RecordingProvider::new(reply), &config());
        let result = dispatcher.ask("Q", &sources()).await.unwrap();
        assert_eq!(result.citations[0].filename.as_deref(), Some("chemistry.pdf"));
        assert_eq!(result.citations[1].filename, None);
    }

    #[tokio::test]
    async fn ask_without_sources_never_calls_provider() {
        let dispatcher = Dispatcher::new(RecordingProvider::new(QueryResult::new("x")), &config());
        let err = dispatcher.ask("What is mitosis?", &[]).await.unwrap_err();
        assert!(matches!(err, CoreError::EmptySources));
        assert!(dispatcher.provider().requests().is_empty());
    }

    #[tokio::test]
    async fn blank_question_rejected() {
        let dispatcher = Dispatcher::new(RecordingProvider::new(QueryResult::new("x")), &config());
        let err = dispatcher.ask("   ", &sources()).await.unwrap_err();
        assert!(matches!(err, CoreError::EmptyQuestion));
        assert!(dispatcher.provider().requests().is_empty());
    }

    #[tokio::test]
    async fn generate_notes_attaches_schema() {
        let dispatcher = Dispatcher::new(RecordingProvider::new(QueryResult::new("[]")), &config());
        let schema = NoteSchema::new().with_focus(Some("cell biology".into()));
        dispatcher.generate_notes(&sources(), &schema).await.unwrap();

        let requests = dispatcher.provider().requests();
        let output = requests[0].output_schema.as_ref().unwrap();
        assert_eq!(output.name, "study_notes");
        assert_eq!(output.schema, schema.json_schema());
        assert!(requests[0].input.contains("cell biology"));
    }

    #[tokio::test]
    async fn generate_notes_without_sources() {
        let dispatcher = Dispatcher::new(RecordingProvider::new(QueryResult::new("[]")), &config());
        let err = dispatcher
            .generate_notes(&[], &NoteSchema::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::EmptySources));
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_call() {
        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::new(HangingProvider, &config()).with_cancellation(cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::task::yield_now().await;
            cancel.cancel();
        });
        let err = dispatcher.ask("Q", &sources()).await.unwrap_err();
        canceller.await.unwrap();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_fails_fast() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let dispatcher = Dispatcher::new(RecordingProvider::new(QueryResult::new("x")), &config())
            .with_cancellation(cancel);
        let err = dispatcher.ask("Q", &sources()).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(dispatcher.provider().requests().is_empty());
    }
}
