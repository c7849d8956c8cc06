//! OpenAI REST client: file upload, vector stores, and the Responses API.

use std::sync::Arc;

use reqwest::RequestBuilder;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::provider::{Citation, ModelProvider, ProviderError, QueryResult, ResponseRequest};
use crate::rate_limit::check_rate_limit_response;
use crate::{CoreError, PdfDocument};

/// Upload purpose that makes files usable by file search.
pub const FILE_PURPOSE: &str = "assistants";

/// Client for the provider's REST API.
///
/// Cheap to clone: the HTTP connection pool and configuration are shared.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: Arc<Config>,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileCounts {
    #[serde(default)]
    pub in_progress: u32,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub cancelled: u32,
    #[serde(default)]
    pub total: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorStore {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub file_counts: FileCounts,
}

impl VectorStore {
    pub fn is_ready(&self) -> bool {
        self.status == "completed" && self.file_counts.in_progress == 0
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct DeletedObject {
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Serialize)]
struct CreateVectorStore<'a> {
    name: &'a str,
    file_ids: &'a [String],
}

#[derive(Debug, Serialize)]
struct ResponsesBody<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<TextConfig<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Tool<'a> {
    FileSearch { vector_store_ids: &'a [String] },
}

#[derive(Debug, Serialize)]
struct TextConfig<'a> {
    format: TextFormat<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TextFormat<'a> {
    JsonSchema {
        name: &'a str,
        schema: &'a serde_json::Value,
        strict: bool,
    },
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    error: Option<ErrorDetail>,
    #[serde(default)]
    incomplete_details: Option<IncompleteDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    OutputText {
        text: String,
        #[serde(default)]
        annotations: Vec<Annotation>,
    },
    Refusal {
        refusal: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Annotation {
    FileCitation {
        file_id: String,
        #[serde(default)]
        filename: Option<String>,
        #[serde(default)]
        index: Option<usize>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct IncompleteDetails {
    #[serde(default)]
    reason: Option<String>,
}

/// OpenAI-style error envelope
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl OpenAiClient {
    /// Build a client. The configuration is validated first, so a missing or
    /// bad key fails here, before any request is made.
    pub fn new(config: Config) -> Result<Self, CoreError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ProviderError::from)?;
        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(self.config.api_key.expose())
    }

    /// Send a request and decode a JSON body, mapping HTTP failures.
    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        check_rate_limit_response(&response)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                ProviderError::UnexpectedResponse(e.to_string())
            }
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout {
                after: self.config.request_timeout,
            }
        } else {
            ProviderError::Http(e)
        }
    }

    /// Upload a PDF for use with file search.
    pub async fn upload_file(&self, doc: &PdfDocument) -> Result<FileObject, ProviderError> {
        let part = Part::bytes(doc.bytes.clone())
            .file_name(doc.filename.clone())
            .mime_str("application/pdf")?;
        let form = Form::new().text("purpose", FILE_PURPOSE).part("file", part);

        let file: FileObject = self
            .send_json(self.http.post(self.url("files")).multipart(form))
            .await?;
        log::info!("uploaded {} as {}", doc.filename, file.id);
        Ok(file)
    }

    pub async fn create_vector_store(
        &self,
        name: &str,
        file_ids: &[String],
    ) -> Result<VectorStore, ProviderError> {
        let body = CreateVectorStore { name, file_ids };
        let store: VectorStore = self
            .send_json(self.http.post(self.url("vector_stores")).json(&body))
            .await?;
        log::info!(
            "created vector store {} with {} file(s)",
            store.id,
            file_ids.len()
        );
        Ok(store)
    }

    pub async fn get_vector_store(&self, id: &str) -> Result<VectorStore, ProviderError> {
        self.send_json(self.http.get(self.url(&format!("vector_stores/{}", id))))
            .await
    }

    pub async fn list_files(&self, purpose: &str) -> Result<Vec<FileObject>, ProviderError> {
        let list: ListResponse<FileObject> = self
            .send_json(
                self.http
                    .get(self.url("files"))
                    .query(&[("purpose", purpose)]),
            )
            .await?;
        Ok(list.data)
    }

    /// First page (up to 100) of vector stores.
    pub async fn list_vector_stores(&self) -> Result<Vec<VectorStore>, ProviderError> {
        let list: ListResponse<VectorStore> = self
            .send_json(
                self.http
                    .get(self.url("vector_stores"))
                    .query(&[("limit", "100")]),
            )
            .await?;
        Ok(list.data)
    }

    pub async fn delete_file(&self, id: &str) -> Result<bool, ProviderError> {
        let deleted: DeletedObject = self
            .send_json(self.http.delete(self.url(&format!("files/{}", id))))
            .await?;
        Ok(deleted.deleted)
    }

    pub async fn delete_vector_store(&self, id: &str) -> Result<bool, ProviderError> {
        let deleted: DeletedObject = self
            .send_json(self.http.delete(self.url(&format!("vector_stores/{}", id))))
            .await?;
        Ok(deleted.deleted)
    }

    async fn create_response(
        &self,
        request: &ResponseRequest,
    ) -> Result<QueryResult, ProviderError> {
        let tools = if request.vector_store_ids.is_empty() {
            Vec::new()
        } else {
            vec![Tool::FileSearch {
                vector_store_ids: &request.vector_store_ids,
            }]
        };
        let text = request.output_schema.as_ref().map(|s| TextConfig {
            format: TextFormat::JsonSchema {
                name: &s.name,
                schema: &s.schema,
                strict: true,
            },
        });
        let body = ResponsesBody {
            model: &request.model,
            instructions: &request.instructions,
            input: &request.input,
            tools,
            text,
            temperature: request.temperature,
        };

        let response: ResponseObject = self
            .send_json(self.http.post(self.url("responses")).json(&body))
            .await?;
        into_query_result(response)
    }
}

impl ModelProvider for OpenAiClient {
    async fn respond(&self, request: &ResponseRequest) -> Result<QueryResult, ProviderError> {
        self.create_response(request).await
    }
}

/// Collect the assistant text and file citations from a Responses API body.
pub(crate) fn into_query_result(response: ResponseObject) -> Result<QueryResult, ProviderError> {
    if let Some(error) = response.error {
        return Err(ProviderError::Failed(error.message));
    }
    match response.status.as_deref() {
        Some("incomplete") => {
            let reason = response
                .incomplete_details
                .and_then(|d| d.reason)
                .unwrap_or_else(|| "unknown reason".to_string());
            return Err(ProviderError::Incomplete(reason));
        }
        Some(status @ ("failed" | "cancelled")) => {
            return Err(ProviderError::Failed(format!("response {}", status)));
        }
        _ => {}
    }

    let mut text = String::new();
    let mut citations: Vec<Citation> = Vec::new();
    let mut refusal = None;

    for item in response.output {
        let OutputItem::Message { content } = item else {
            continue;
        };
        for part in content {
            match part {
                ContentPart::OutputText {
                    text: chunk,
                    annotations,
                } => {
                    for annotation in annotations {
                        if let Annotation::FileCitation {
                            file_id,
                            filename,
                            index,
                        } = annotation
                        {
                            if !citations.iter().any(|c| c.file_id == file_id) {
                                citations.push(Citation {
                                    file_id,
                                    filename,
                                    index: index.map(|i| i + text.chars().count()),
                                });
                            }
                        }
                    }
                    text.push_str(&chunk);
                }
                ContentPart::Refusal { refusal: reason } => refusal = Some(reason),
                ContentPart::Other => {}
            }
        }
    }

    if text.trim().is_empty() {
        return Err(match refusal {
            Some(reason) => ProviderError::Refused(reason),
            None => ProviderError::UnexpectedResponse("response contained no output text".into()),
        });
    }

    Ok(QueryResult {
        response_id: response.id,
        text,
        citations,
    })
}

/// Pull the message out of an OpenAI-style error body, falling back to the
/// raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error)
        .map(|d| d.message)
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<QueryResult, ProviderError> {
        into_query_result(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn message_with_citations() {
        let result = parse(json!({
            "id": "resp_123",
            "status": "completed",
            "output": [
                {"type": "file_search_call", "id": "fs_1", "status": "completed", "queries": ["mitosis"]},
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [{
                        "type": "output_text",
                        "text": "Mitosis produces two identical cells.",
                        "annotations": [
                            {"type": "file_citation", "index": 37, "file_id": "file-abc", "filename": "biology.pdf"},
                            {"type": "file_citation", "index": 37, "file_id": "file-abc", "filename": "biology.pdf"},
                            {"type": "url_citation", "url": "https://example.org"}
                        ]
                    }]
                }
            ]
        }))
        .unwrap();

        assert_eq!(result.response_id.as_deref(), Some("resp_123"));
        assert_eq!(result.text, "Mitosis produces two identical cells.");
        assert_eq!(
            result.citations,
            vec![Citation {
                file_id: "file-abc".into(),
                filename: Some("biology.pdf".into()),
                index: Some(37),
            }]
        );
    }

    #[test]
    fn multiple_text_parts_concatenated() {
        let result = parse(json!({
            "status": "completed",
            "output": [{
                "type": "message",
                "content": [
                    {"type": "output_text", "text": "[{\"title\":", "annotations": []},
                    {"type": "output_text", "text": "\"x\"}]", "annotations": [
                        {"type": "file_citation", "index": 2, "file_id": "file-1"}
                    ]}
                ]
            }]
        }))
        .unwrap();
        assert_eq!(result.text, "[{\"title\":\"x\"}]");
        assert_eq!(result.citations[0].index, Some(12));
        assert_eq!(result.citations[0].filename, None);
    }

    #[test]
    fn refusal_without_text() {
        let err = parse(json!({
            "status": "completed",
            "output": [{
                "type": "message",
                "content": [{"type": "refusal", "refusal": "I can't help with that."}]
            }]
        }))
        .unwrap_err();
        assert!(matches!(err, ProviderError::Refused(r) if r == "I can't help with that."));
    }

    #[test]
    fn incomplete_response() {
        let err = parse(json!({
            "status": "incomplete",
            "incomplete_details": {"reason": "max_output_tokens"},
            "output": []
        }))
        .unwrap_err();
        assert!(matches!(err, ProviderError::Incomplete(r) if r == "max_output_tokens"));
    }

    #[test]
    fn error_object_in_body() {
        let err = parse(json!({
            "status": "failed",
            "error": {"code": "server_error", "message": "The server had an error"},
            "output": []
        }))
        .unwrap_err();
        assert!(matches!(err, ProviderError::Failed(m) if m == "The server had an error"));
    }

    #[test]
    fn empty_output() {
        let err = parse(json!({"status": "completed", "output": []})).unwrap_err();
        assert!(matches!(err, ProviderError::UnexpectedResponse(_)));
    }

    #[test]
    fn request_body_shape() {
        let ids = vec!["vs_1".to_string()];
        let schema = json!({"type": "object"});
        let body = ResponsesBody {
            model: "gpt-4o-mini",
            instructions: "Be brief.",
            input: "What is mitosis?",
            tools: vec![Tool::FileSearch {
                vector_store_ids: &ids,
            }],
            text: Some(TextConfig {
                format: TextFormat::JsonSchema {
                    name: "study_notes",
                    schema: &schema,
                    strict: true,
                },
            }),
            temperature: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "model": "gpt-4o-mini",
                "instructions": "Be brief.",
                "input": "What is mitosis?",
                "tools": [{"type": "file_search", "vector_store_ids": ["vs_1"]}],
                "text": {"format": {
                    "type": "json_schema",
                    "name": "study_notes",
                    "schema": {"type": "object"},
                    "strict": true
                }}
            })
        );
    }

    #[test]
    fn error_message_extraction() {
        assert_eq!(
            api_error_message(r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#),
            "Incorrect API key provided"
        );
        assert_eq!(api_error_message("  Bad Gateway \n"), "Bad Gateway");
    }

    #[test]
    fn vector_store_readiness() {
        let store: VectorStore = serde_json::from_value(json!({
            "id": "vs_1",
            "name": "Study Materials",
            "status": "in_progress",
            "file_counts": {"in_progress": 1, "completed": 0, "failed": 0, "cancelled": 0, "total": 1}
        }))
        .unwrap();
        assert!(!store.is_ready());

        let store: VectorStore = serde_json::from_value(json!({
            "id": "vs_1",
            "status": "completed",
            "file_counts": {"in_progress": 0, "completed": 1, "failed": 0, "cancelled": 0, "total": 1}
        }))
        .unwrap();
        assert!(store.is_ready());
    }

    #[test]
    fn client_rejects_invalid_config() {
        let err = OpenAiClient::new(Config::with_api_key("")).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
