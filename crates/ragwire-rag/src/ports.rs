//! Collaborator ports consumed by the domain service.
//!
//! Each port is an async trait behind which a real backend sits: a vector
//! database, a relational store, an LLM summarizer. The protocol core
//! imposes no persistence semantics on any of them; [`crate::mock`]
//! provides in-memory implementations for tests and demos.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{Document, ProcessingStatus, SearchResult, SummarizeRequest};

/// Errors surfaced by the collaborator ports and the domain service.
#[derive(Debug, Error)]
pub enum RagError {
    /// The request itself is invalid (empty query, bad limit, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No document with the given id.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The search backend failed.
    #[error("search error: {0}")]
    Search(String),

    /// The summarization backend failed.
    #[error("summarization error: {0}")]
    Summarization(String),
}

/// Vector/keyword search over indexed documents.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Vector-similarity search.
    async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, RagError>;

    /// Term-match search.
    async fn keyword_search(&self, query: &str, limit: usize)
    -> Result<Vec<SearchResult>, RagError>;
}

/// Document storage and lifecycle.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store a new document; returns its id.
    async fn upload(
        &self,
        filename: &str,
        content: &[u8],
        metadata: Value,
    ) -> Result<String, RagError>;

    /// List documents with pagination and optional filters.
    async fn list(
        &self,
        limit: usize,
        offset: usize,
        filters: Option<&Value>,
    ) -> Result<Vec<Document>, RagError>;

    /// Fetch a document by id.
    async fn get(&self, document_id: &str) -> Result<Option<Document>, RagError>;

    /// Delete a document; returns whether it existed.
    async fn delete(&self, document_id: &str) -> Result<bool, RagError>;

    /// Processing status of a document.
    async fn status(&self, document_id: &str) -> Result<ProcessingStatus, RagError>;
}

/// Result of one summarization run, before it is wrapped in a response.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutcome {
    /// The generated text.
    pub text: String,
    /// Provider confidence in `[0, 1]`.
    pub confidence: f64,
    /// Provider-side processing time.
    pub processing_time_ms: f64,
}

/// Document summarization.
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    /// Summarize the given documents according to the request.
    async fn summarize(
        &self,
        documents: &[Document],
        request: &SummarizeRequest,
    ) -> Result<SummaryOutcome, RagError>;
}
