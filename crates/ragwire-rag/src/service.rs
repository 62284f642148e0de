//! The RAG domain service.
//!
//! Coordinates the collaborator ports and owns the business validation
//! rules: queries must be non-empty, limits bounded, modes known. Hybrid
//! search merges the semantic and keyword result sets by score.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::domain::{
    Document, ProcessingStatus, SearchMode, SearchQuery, SearchResponse, SearchResult,
    SummarizeRequest, SummaryResponse, metadata_matches,
};
use crate::ports::{DocumentStore, RagError, SearchProvider, SummaryProvider};

/// Bounds on the search result limit.
pub const SEARCH_LIMIT_RANGE: std::ops::RangeInclusive<usize> = 1..=100;
/// Bounds on the summary length, in characters.
pub const SUMMARY_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 50..=2000;
/// Largest accepted document upload, in bytes.
pub const MAX_DOCUMENT_SIZE: usize = 50 * 1024 * 1024;
/// File extensions accepted for upload.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "docx", "txt", "md"];

/// Coordinates search, storage and summarization behind one interface.
pub struct RagService {
    search: Arc<dyn SearchProvider>,
    store: Arc<dyn DocumentStore>,
    summarizer: Arc<dyn SummaryProvider>,
}

impl RagService {
    /// Wire a service from its collaborator ports.
    #[must_use]
    pub fn new(
        search: Arc<dyn SearchProvider>,
        store: Arc<dyn DocumentStore>,
        summarizer: Arc<dyn SummaryProvider>,
    ) -> Self {
        Self {
            search,
            store,
            summarizer,
        }
    }

    /// Execute a search query.
    ///
    /// Results failing the query's metadata filters or scoring below its
    /// threshold are dropped; hybrid mode merges both providers' results
    /// by descending score and truncates to the limit.
    pub async fn search(&self, query: SearchQuery) -> Result<SearchResponse, RagError> {
        if query.query.trim().is_empty() {
            return Err(RagError::InvalidRequest(
                "search query cannot be empty".to_string(),
            ));
        }
        if !SEARCH_LIMIT_RANGE.contains(&query.limit) {
            return Err(RagError::InvalidRequest(format!(
                "search limit must be between {} and {}",
                SEARCH_LIMIT_RANGE.start(),
                SEARCH_LIMIT_RANGE.end()
            )));
        }

        let started = Instant::now();
        let mut results = match query.mode {
            SearchMode::Semantic => {
                self.search
                    .semantic_search(&query.query, query.limit)
                    .await?
            }
            SearchMode::Keyword => self.search.keyword_search(&query.query, query.limit).await?,
            SearchMode::Hybrid => self.hybrid_search(&query.query, query.limit).await?,
        };

        results.retain(|r| metadata_matches(&r.metadata, query.filters.as_ref()));
        results.retain(|r| r.score >= query.threshold);
        results.truncate(query.limit);

        tracing::debug!(
            query = %query.query,
            mode = query.mode.as_str(),
            results = results.len(),
            "search complete"
        );

        Ok(SearchResponse {
            total_results: results.len(),
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            results,
            query,
        })
    }

    async fn hybrid_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, RagError> {
        let half = (limit / 2).max(1);
        let mut results = self.search.semantic_search(query, half).await?;
        results.extend(self.search.keyword_search(query, half).await?);
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);
        Ok(results)
    }

    /// Summarize a set of documents.
    pub async fn summarize(&self, request: SummarizeRequest) -> Result<SummaryResponse, RagError> {
        if request.document_ids.is_empty() {
            return Err(RagError::InvalidRequest(
                "document_ids cannot be empty".to_string(),
            ));
        }
        if !SUMMARY_LENGTH_RANGE.contains(&request.max_length) {
            return Err(RagError::InvalidRequest(format!(
                "max_length must be between {} and {}",
                SUMMARY_LENGTH_RANGE.start(),
                SUMMARY_LENGTH_RANGE.end()
            )));
        }

        let started = Instant::now();
        let mut documents = Vec::with_capacity(request.document_ids.len());
        for id in &request.document_ids {
            let doc = self
                .store
                .get(id)
                .await?
                .ok_or_else(|| RagError::DocumentNotFound(id.clone()))?;
            documents.push(doc);
        }

        let outcome = self.summarizer.summarize(&documents, &request).await?;

        Ok(SummaryResponse {
            summary: outcome.text,
            source_documents: request.document_ids,
            mode: request.mode,
            confidence: outcome.confidence,
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Upload a document; returns its id.
    pub async fn upload_document(
        &self,
        filename: &str,
        content: &[u8],
        metadata: Value,
    ) -> Result<String, RagError> {
        if filename.trim().is_empty() {
            return Err(RagError::InvalidRequest(
                "filename cannot be empty".to_string(),
            ));
        }
        if content.is_empty() {
            return Err(RagError::InvalidRequest(
                "document content cannot be empty".to_string(),
            ));
        }
        if content.len() > MAX_DOCUMENT_SIZE {
            return Err(RagError::InvalidRequest(
                "document size exceeds the 50MB limit".to_string(),
            ));
        }
        // The extension is everything after the last dot; a dotless name
        // is its own extension, and fails the whitelist.
        let lowered = filename.to_lowercase();
        let extension = lowered.rsplit('.').next().unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&extension) {
            return Err(RagError::InvalidRequest(format!(
                "unsupported file type: {extension}"
            )));
        }
        self.store.upload(filename, content, metadata).await
    }

    /// List documents with pagination.
    pub async fn list_documents(
        &self,
        limit: usize,
        offset: usize,
        filters: Option<&Value>,
    ) -> Result<Vec<Document>, RagError> {
        if !SEARCH_LIMIT_RANGE.contains(&limit) {
            return Err(RagError::InvalidRequest(format!(
                "list limit must be between {} and {}",
                SEARCH_LIMIT_RANGE.start(),
                SEARCH_LIMIT_RANGE.end()
            )));
        }
        self.store.list(limit, offset, filters).await
    }

    /// Fetch a document by id.
    pub async fn get_document(&self, document_id: &str) -> Result<Option<Document>, RagError> {
        self.store.get(document_id).await
    }

    /// Delete a document; returns whether it existed.
    pub async fn delete_document(&self, document_id: &str) -> Result<bool, RagError> {
        self.store.delete(document_id).await
    }

    /// Processing status of a document.
    pub async fn document_status(&self, document_id: &str) -> Result<ProcessingStatus, RagError> {
        self.store.status(document_id).await
    }
}
