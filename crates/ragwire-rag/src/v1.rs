//! The version-1.0 protocol adapter.
//!
//! Translates tool calls into domain-service operations. The tool surface
//! is fixed: `rag_search`, `rag_summarize`, `document_upload`,
//! `document_list`, `document_get`, `document_delete`. Each tool's JSON
//! schema is the authoritative parameter contract; dispatch validates
//! against it before touching the service.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use serde_json::{Map, Value, json};

use ragwire_core::adapter::ToolAdapter;
use ragwire_core::error::ProtocolError;
use ragwire_core::version::ProtocolVersion;

use crate::domain::{Document, SearchMode, SearchQuery, SummarizeRequest, SummaryMode};
use crate::ports::RagError;
use crate::service::RagService;

const TOOLS: [&str; 6] = [
    "rag_search",
    "rag_summarize",
    "document_upload",
    "document_list",
    "document_get",
    "document_delete",
];

/// Version-1.0 adapter over the RAG domain service.
pub struct RagAdapterV1 {
    service: Arc<RagService>,
    version: ProtocolVersion,
}

impl RagAdapterV1 {
    /// Create the v1.0 adapter.
    #[must_use]
    pub fn new(service: Arc<RagService>) -> Self {
        Self::with_version(service, ProtocolVersion::new("1.0"))
    }

    /// Create the adapter under a different version string.
    ///
    /// Used to register the same tool surface under a successor version
    /// while that version's own surface is being developed.
    #[must_use]
    pub fn with_version(service: Arc<RagService>, version: ProtocolVersion) -> Self {
        Self { service, version }
    }

    async fn handle_rag_search(
        &self,
        params: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ProtocolError> {
        let query_text = require_str(params, "query")?;
        let limit = optional_usize(params, "limit", 10)?;
        let threshold = optional_f64(params, "threshold", 0.7)?;
        let mode_name = optional_str(params, "search_type", "semantic")?;
        let mode = SearchMode::parse(mode_name).ok_or_else(|| {
            ProtocolError::invalid_argument(format!("unknown search_type: {mode_name}"))
        })?;

        let query = SearchQuery {
            query: query_text.to_string(),
            limit,
            threshold,
            mode,
            filters: params.get("filters").cloned(),
        };

        let response = self
            .service
            .search(query)
            .await
            .map_err(|e| rag_error("rag_search", e))?;

        let results: Vec<Value> = response
            .results
            .iter()
            .map(|r| {
                json!({
                    "id": r.id,
                    "content": r.content,
                    "score": r.score,
                    "metadata": r.metadata,
                    "type": r.kind.as_str(),
                    "document_id": r.document_id,
                })
            })
            .collect();

        Ok(object(json!({
            "results": results,
            "total_results": response.total_results,
            "processing_time_ms": response.processing_time_ms,
            "query_metadata": {
                "original_query": response.query.query,
                "search_type": response.query.mode.as_str(),
                "threshold": response.query.threshold,
            },
        })))
    }

    async fn handle_rag_summarize(
        &self,
        params: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ProtocolError> {
        let ids = params
            .get("document_ids")
            .ok_or_else(|| ProtocolError::missing_parameter("document_ids"))?;
        let ids = ids
            .as_array()
            .ok_or_else(|| ProtocolError::invalid_argument("document_ids must be a list"))?;
        let document_ids: Vec<String> = ids
            .iter()
            .map(|v| {
                v.as_str().map(String::from).ok_or_else(|| {
                    ProtocolError::invalid_argument("document_ids must contain strings")
                })
            })
            .collect::<Result<_, _>>()?;

        let mode_name = optional_str(params, "summary_type", "extractive")?;
        let mode = SummaryMode::parse(mode_name).ok_or_else(|| {
            ProtocolError::invalid_argument(format!("unknown summary_type: {mode_name}"))
        })?;

        let request = SummarizeRequest {
            document_ids,
            mode,
            max_length: optional_usize(params, "max_length", 500)?,
            language: optional_str(params, "language", "en")?.to_string(),
        };

        let response = self
            .service
            .summarize(request)
            .await
            .map_err(|e| rag_error("rag_summarize", e))?;

        Ok(object(json!({
            "summary": response.summary,
            "summary_type": response.mode.as_str(),
            "source_documents": response.source_documents,
            "confidence_score": response.confidence,
            "processing_time_ms": response.processing_time_ms,
        })))
    }

    async fn handle_document_upload(
        &self,
        params: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ProtocolError> {
        let filename = require_str(params, "filename")?;
        let encoded = require_str(params, "content")?;
        let content = BASE64.decode(encoded).map_err(|e| {
            ProtocolError::invalid_argument(format!("invalid base64 content: {e}"))
        })?;
        let metadata = params.get("metadata").cloned().unwrap_or_else(|| json!({}));

        let document_id = self
            .service
            .upload_document(filename, &content, metadata)
            .await
            .map_err(|e| rag_error("document_upload", e))?;

        Ok(object(json!({
            "document_id": document_id,
            "status": "uploaded",
            "filename": filename,
            "uploaded_at": Utc::now(),
        })))
    }

    async fn handle_document_list(
        &self,
        params: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ProtocolError> {
        let limit = optional_usize(params, "limit", 50)?;
        let offset = optional_usize(params, "offset", 0)?;

        let documents = self
            .service
            .list_documents(limit, offset, params.get("filters"))
            .await
            .map_err(|e| rag_error("document_list", e))?;

        let listed: Vec<Value> = documents.iter().map(document_summary).collect();
        Ok(object(json!({
            "documents": listed,
            "total_count": documents.len(),
            "limit": limit,
            "offset": offset,
        })))
    }

    async fn handle_document_get(
        &self,
        params: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ProtocolError> {
        let document_id = require_str(params, "document_id")?;
        let document = self
            .service
            .get_document(document_id)
            .await
            .map_err(|e| rag_error("document_get", e))?
            .ok_or_else(|| {
                ProtocolError::tool_execution(
                    "document_get",
                    format!("document not found: {document_id}"),
                )
            })?;

        Ok(object(json!({"document": document_detail(&document)})))
    }

    async fn handle_document_delete(
        &self,
        params: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ProtocolError> {
        let document_id = require_str(params, "document_id")?;
        let success = self
            .service
            .delete_document(document_id)
            .await
            .map_err(|e| rag_error("document_delete", e))?;

        Ok(object(json!({
            "success": success,
            "document_id": document_id,
            "deleted_at": Utc::now(),
        })))
    }
}

#[async_trait]
impl ToolAdapter for RagAdapterV1 {
    fn version(&self) -> ProtocolVersion {
        self.version.clone()
    }

    fn tools(&self) -> Vec<String> {
        TOOLS.iter().map(ToString::to_string).collect()
    }

    fn tool_schema(&self, tool: &str) -> Option<Value> {
        let schema = match tool {
            "rag_search" => json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query text"
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 100,
                        "default": 10,
                        "description": "Maximum number of results to return"
                    },
                    "threshold": {
                        "type": "number",
                        "minimum": 0.0,
                        "maximum": 1.0,
                        "default": 0.7,
                        "description": "Minimum similarity score threshold"
                    },
                    "search_type": {
                        "type": "string",
                        "enum": ["semantic", "keyword", "hybrid"],
                        "default": "semantic",
                        "description": "Type of search to perform"
                    },
                    "filters": {
                        "type": "object",
                        "description": "Additional filters to apply"
                    }
                },
                "required": ["query"]
            }),
            "rag_summarize" => json!({
                "type": "object",
                "properties": {
                    "document_ids": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "List of document IDs to summarize"
                    },
                    "summary_type": {
                        "type": "string",
                        "enum": ["extractive", "abstractive", "key_points"],
                        "default": "extractive",
                        "description": "Type of summary to generate"
                    },
                    "max_length": {
                        "type": "integer",
                        "minimum": 50,
                        "maximum": 2000,
                        "default": 500,
                        "description": "Maximum length of summary in characters"
                    },
                    "language": {
                        "type": "string",
                        "default": "en",
                        "description": "Language for the summary"
                    }
                },
                "required": ["document_ids"]
            }),
            "document_upload" => json!({
                "type": "object",
                "properties": {
                    "filename": {
                        "type": "string",
                        "description": "Original filename"
                    },
                    "content": {
                        "type": "string",
                        "description": "Base64 encoded file content"
                    },
                    "metadata": {
                        "type": "object",
                        "description": "Optional metadata for the document"
                    }
                },
                "required": ["filename", "content"]
            }),
            "document_list" => json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 100,
                        "default": 50,
                        "description": "Maximum number of documents to return"
                    },
                    "offset": {
                        "type": "integer",
                        "minimum": 0,
                        "default": 0,
                        "description": "Number of documents to skip"
                    },
                    "filters": {
                        "type": "object",
                        "description": "Filters to apply to the document list"
                    }
                }
            }),
            "document_get" => json!({
                "type": "object",
                "properties": {
                    "document_id": {
                        "type": "string",
                        "description": "ID of the document to retrieve"
                    }
                },
                "required": ["document_id"]
            }),
            "document_delete" => json!({
                "type": "object",
                "properties": {
                    "document_id": {
                        "type": "string",
                        "description": "ID of the document to delete"
                    }
                },
                "required": ["document_id"]
            }),
            _ => return None,
        };
        Some(schema)
    }

    async fn dispatch(
        &self,
        tool: &str,
        parameters: Map<String, Value>,
    ) -> Result<Map<String, Value>, ProtocolError> {
        tracing::debug!(tool, version = %self.version, "dispatching tool call");
        match tool {
            "rag_search" => self.handle_rag_search(&parameters).await,
            "rag_summarize" => self.handle_rag_summarize(&parameters).await,
            "document_upload" => self.handle_document_upload(&parameters).await,
            "document_list" => self.handle_document_list(&parameters).await,
            "document_get" => self.handle_document_get(&parameters).await,
            "document_delete" => self.handle_document_delete(&parameters).await,
            other => Err(ProtocolError::UnsupportedTool(other.to_string())),
        }
    }
}

fn rag_error(tool: &str, err: RagError) -> ProtocolError {
    match err {
        RagError::InvalidRequest(message) => ProtocolError::invalid_argument(message),
        other => ProtocolError::tool_execution(tool, other.to_string()),
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn document_summary(doc: &Document) -> Value {
    json!({
        "id": doc.id.to_string(),
        "filename": doc.filename,
        "created_at": doc.created_at,
        "updated_at": doc.updated_at,
        "size_bytes": doc.size_bytes,
        "processing_status": doc.status.as_str(),
        "metadata": doc.metadata,
    })
}

fn document_detail(doc: &Document) -> Value {
    json!({
        "id": doc.id.to_string(),
        "filename": doc.filename,
        "content": doc.content,
        "created_at": doc.created_at,
        "updated_at": doc.updated_at,
        "size_bytes": doc.size_bytes,
        "processing_status": doc.status.as_str(),
        "content_hash": doc.content_hash,
        "metadata": doc.metadata,
    })
}

fn require_str<'a>(params: &'a Map<String, Value>, name: &str) -> Result<&'a str, ProtocolError> {
    params
        .get(name)
        .ok_or_else(|| ProtocolError::missing_parameter(name))?
        .as_str()
        .ok_or_else(|| ProtocolError::invalid_argument(format!("{name} must be a string")))
}

fn optional_str<'a>(
    params: &'a Map<String, Value>,
    name: &str,
    default: &'static str,
) -> Result<&'a str, ProtocolError> {
    match params.get(name) {
        None => Ok(default),
        Some(value) => value
            .as_str()
            .ok_or_else(|| ProtocolError::invalid_argument(format!("{name} must be a string"))),
    }
}

fn optional_usize(
    params: &Map<String, Value>,
    name: &str,
    default: usize,
) -> Result<usize, ProtocolError> {
    match params.get(name) {
        None => Ok(default),
        Some(value) => value.as_u64().map(|n| n as usize).ok_or_else(|| {
            ProtocolError::invalid_argument(format!("{name} must be a non-negative integer"))
        }),
    }
}

fn optional_f64(
    params: &Map<String, Value>,
    name: &str,
    default: f64,
) -> Result<f64, ProtocolError> {
    match params.get(name) {
        None => Ok(default),
        Some(value) => value
            .as_f64()
            .ok_or_else(|| ProtocolError::invalid_argument(format!("{name} must be a number"))),
    }
}
