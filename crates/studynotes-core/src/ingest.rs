//! Getting PDFs to the provider: upload, index into a vector store, wait until
//! searchable. Also the reverse: deleting what was uploaded.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::openai::{FILE_PURPOSE, FileObject, OpenAiClient, VectorStore};
use crate::provider::ProviderError;
use crate::source::{DocumentRef, vector_store_ids};
use crate::{CoreError, PdfDocument};

/// Name given to every vector store this tool creates.
pub const VECTOR_STORE_NAME: &str = "Study Materials";

/// Progress events emitted during ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    Uploading {
        index: usize,
        total: usize,
        filename: String,
    },
    Uploaded {
        filename: String,
        file_id: String,
    },
    Indexing {
        completed: u32,
        total: u32,
    },
    Ready {
        vector_store_id: String,
    },
}

/// Provider-side storage for uploaded files and vector stores.
pub trait SourceStore {
    fn upload_file(
        &self,
        doc: &PdfDocument,
    ) -> impl Future<Output = Result<FileObject, ProviderError>> + Send;

    fn create_vector_store(
        &self,
        name: &str,
        file_ids: &[String],
    ) -> impl Future<Output = Result<VectorStore, ProviderError>> + Send;

    fn get_vector_store(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<VectorStore, ProviderError>> + Send;

    fn list_files(&self) -> impl Future<Output = Result<Vec<FileObject>, ProviderError>> + Send;

    fn list_vector_stores(
        &self,
    ) -> impl Future<Output = Result<Vec<VectorStore>, ProviderError>> + Send;

    fn delete_file(&self, id: &str) -> impl Future<Output = Result<bool, ProviderError>> + Send;

    fn delete_vector_store(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<bool, ProviderError>> + Send;
}

impl SourceStore for OpenAiClient {
    async fn upload_file(&self, doc: &PdfDocument) -> Result<FileObject, ProviderError> {
        OpenAiClient::upload_file(self, doc).await
    }

    async fn create_vector_store(
        &self,
        name: &str,
        file_ids: &[String],
    ) -> Result<VectorStore, ProviderError> {
        OpenAiClient::create_vector_store(self, name, file_ids).await
    }

    async fn get_vector_store(&self, id: &str) -> Result<VectorStore, ProviderError> {
        OpenAiClient::get_vector_store(self, id).await
    }

    async fn list_files(&self) -> Result<Vec<FileObject>, ProviderError> {
        OpenAiClient::list_files(self, FILE_PURPOSE).await
    }

    async fn list_vector_stores(&self) -> Result<Vec<VectorStore>, ProviderError> {
        OpenAiClient::list_vector_stores(self).await
    }

    async fn delete_file(&self, id: &str) -> Result<bool, ProviderError> {
        OpenAiClient::delete_file(self, id).await
    }

    async fn delete_vector_store(&self, id: &str) -> Result<bool, ProviderError> {
        OpenAiClient::delete_vector_store(self, id).await
    }
}

/// Upload `docs`, index them into one new vector store and wait until it is
/// searchable.
///
/// Polls every `poll_interval`, at most `max_attempts` times. If anything
/// fails, files and the store created so far are deleted before the error is
/// returned.
pub async fn ingest<S: SourceStore + Sync>(
    store: &S,
    docs: &[PdfDocument],
    poll_interval: Duration,
    max_attempts: u32,
    progress: impl Fn(IngestEvent),
    cancel: &CancellationToken,
) -> Result<Vec<DocumentRef>, CoreError> {
    if docs.is_empty() {
        return Err(CoreError::EmptySources);
    }

    let mut uploaded: Vec<FileObject> = Vec::with_capacity(docs.len());
    for (index, doc) in docs.iter().enumerate() {
        progress(IngestEvent::Uploading {
            index,
            total: docs.len(),
            filename: doc.filename.clone(),
        });
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            outcome = store.upload_file(doc) => outcome,
        };
        match outcome {
            Ok(file) => {
                progress(IngestEvent::Uploaded {
                    filename: doc.filename.clone(),
                    file_id: file.id.clone(),
                });
                uploaded.push(file);
            }
            Err(e) => {
                discard_files(store, &uploaded).await;
                return Err(e.into());
            }
        }
    }

    let file_ids: Vec<String> = uploaded.iter().map(|f| f.id.clone()).collect();
    let created = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        created = store.create_vector_store(VECTOR_STORE_NAME, &file_ids) => created,
    };
    let vector_store = match created {
        Ok(vs) => vs,
        Err(e) => {
            discard_files(store, &uploaded).await;
            return Err(e.into());
        }
    };

    if let Err(e) = wait_until_ready(
        store,
        &vector_store,
        poll_interval,
        max_attempts,
        &progress,
        cancel,
    )
    .await
    {
        if let Err(del) = store.delete_vector_store(&vector_store.id).await {
            log::warn!("could not delete vector store {}: {}", vector_store.id, del);
        }
        discard_files(store, &uploaded).await;
        return Err(e.into());
    }

    progress(IngestEvent::Ready {
        vector_store_id: vector_store.id.clone(),
    });

    Ok(docs
        .iter()
        .zip(uploaded)
        .map(|(doc, file)| DocumentRef {
            file_id: file.id,
            filename: doc.filename.clone(),
            vector_store_id: vector_store.id.clone(),
        })
        .collect())
}

async fn wait_until_ready<S: SourceStore + Sync>(
    store: &S,
    created: &VectorStore,
    poll_interval: Duration,
    max_attempts: u32,
    progress: &impl Fn(IngestEvent),
    cancel: &CancellationToken,
) -> Result<(), ProviderError> {
    let mut current = created.clone();
    for attempt in 0..max_attempts {
        let counts = &current.file_counts;
        if counts.failed > 0 && counts.in_progress == 0 {
            return Err(ProviderError::IndexingFailed {
                vector_store_id: current.id.clone(),
                failed: counts.failed,
                total: counts.total,
            });
        }
        if current.is_ready() {
            return Ok(());
        }
        progress(IngestEvent::Indexing {
            completed: counts.completed,
            total: counts.total,
        });
        log::debug!(
            "vector store {} is {} ({}/{} indexed), poll {}/{}",
            current.id,
            current.status,
            counts.completed,
            counts.total,
            attempt + 1,
            max_attempts
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            _ = tokio::time::sleep(poll_interval) => {}
        }
        let id = current.id.clone();
        current = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            polled = store.get_vector_store(&id) => polled?,
        };
    }

    if current.is_ready() {
        return Ok(());
    }
    Err(ProviderError::Timeout {
        after: poll_interval * max_attempts,
    })
}

/// Best-effort deletion of uploaded files after a failed ingestion.
async fn discard_files<S: SourceStore + Sync>(store: &S, files: &[FileObject]) {
    for file in files {
        if let Err(e) = store.delete_file(&file.id).await {
            log::warn!("could not delete uploaded file {}: {}", file.id, e);
        }
    }
}

/// What a cleanup removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted_vector_stores: Vec<String>,
    pub deleted_files: Vec<String>,
    /// Human-readable descriptions of deletions that failed.
    pub failures: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Delete the vector stores and files behind `sources`. Failures are
/// collected, not returned, so one bad deletion does not leave the rest.
pub async fn release<S: SourceStore + Sync>(store: &S, sources: &[DocumentRef]) -> CleanupReport {
    let mut report = CleanupReport::default();
    for id in vector_store_ids(sources) {
        delete_store(store, &id, &mut report).await;
    }
    for source in sources {
        delete_one_file(store, &source.file_id, &mut report).await;
    }
    report
}

/// Delete every vector store named [`VECTOR_STORE_NAME`] and every uploaded
/// PDF, including leftovers from earlier runs.
pub async fn purge<S: SourceStore + Sync>(store: &S) -> Result<CleanupReport, CoreError> {
    let mut report = CleanupReport::default();

    for vs in store.list_vector_stores().await? {
        if vs.name.as_deref() == Some(VECTOR_STORE_NAME) {
            delete_store(store, &vs.id, &mut report).await;
        }
    }
    for file in store.list_files().await? {
        if file.purpose == FILE_PURPOSE && file.filename.to_ascii_lowercase().ends_with(".pdf") {
            delete_one_file(store, &file.id, &mut report).await;
        }
    }

    Ok(report)
}

async fn delete_store<S: SourceStore + Sync>(store: &S, id: &str, report: &mut CleanupReport) {
    match store.delete_vector_store(id).await {
        Ok(true) => {
            log::info!("deleted vector store {}", id);
            report.deleted_vector_stores.push(id.to_string());
        }
        Ok(false) => report
            .failures
            .push(format!("vector store {}: not deleted", id)),
        Err(e) => report
            .failures
            .push(format!("vector store {}: {}", id, e)),
    }
}

async fn delete_one_file<S: SourceStore + Sync>(store: &S, id: &str, report: &mut CleanupReport) {
    match store.delete_file(id).await {
        Ok(true) => {
            log::info!("deleted file {}", id);
            report.deleted_files.push(id.to_string());
        }
        Ok(false) => report.failures.push(format!("file {}: not deleted", id)),
        Err(e) => report.failures.push(format!("file {}: {}", id, e)),
    }
}
