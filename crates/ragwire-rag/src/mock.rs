//! In-memory mock providers for development, demos and tests.
//!
//! These stand in for the real vector database, document store and
//! summarizer. Search results are deterministic and ranked; documents
//! live in a map keyed by generated id.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    Document, ProcessingStatus, SearchResult, SearchResultKind, SummarizeRequest, SummaryMode,
    metadata_matches,
};
use crate::ports::{DocumentStore, RagError, SearchProvider, SummaryOutcome, SummaryProvider};

/// Deterministic ranked search results.
#[derive(Debug, Default)]
pub struct MockSearchProvider;

impl MockSearchProvider {
    /// Create a mock search provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, RagError> {
        tracing::debug!(query, "mock semantic search");
        let results = (0..limit.min(3))
            .map(|i| SearchResult {
                id: format!("doc_{}", i + 1),
                content: format!("Semantic match {} for query: {query}", i + 1),
                metadata: json!({"source": "mock_semantic", "query": query}),
                score: 0.9 - (i as f64) * 0.1,
                kind: SearchResultKind::Document,
                document_id: Some(format!("doc_{}", i + 1)),
                chunk_index: Some(0),
            })
            .collect();
        Ok(results)
    }

    async fn keyword_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, RagError> {
        tracing::debug!(query, "mock keyword search");
        let results = (0..limit.min(2))
            .map(|i| SearchResult {
                id: format!("keyword_doc_{}", i + 1),
                content: format!("Keyword match {} for: {query}", i + 1),
                metadata: json!({"source": "mock_keyword", "query": query}),
                score: 0.8 - (i as f64) * 0.2,
                kind: SearchResultKind::Chunk,
                document_id: Some(format!("doc_{}", i + 1)),
                chunk_index: Some(i),
            })
            .collect();
        Ok(results)
    }
}

/// Map-backed document store.
#[derive(Debug, Default)]
pub struct MockDocumentStore {
    documents: RwLock<HashMap<String, Document>>,
}

impl MockDocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MockDocumentStore {
    async fn upload(
        &self,
        filename: &str,
        content: &[u8],
        metadata: Value,
    ) -> Result<String, RagError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let content_hash = Sha256::digest(content)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>();

        let document = Document {
            id,
            filename: filename.to_string(),
            content: String::from_utf8_lossy(content).into_owned(),
            metadata,
            created_at: now,
            updated_at: now,
            status: ProcessingStatus::Completed,
            content_hash,
            size_bytes: content.len(),
        };

        self.documents
            .write()
            .await
            .insert(id.to_string(), document);
        tracing::debug!(document_id = %id, filename, "mock document stored");
        Ok(id.to_string())
    }

    async fn list(
        &self,
        limit: usize,
        offset: usize,
        filters: Option<&Value>,
    ) -> Result<Vec<Document>, RagError> {
        let documents = self.documents.read().await;
        let mut all: Vec<Document> = documents
            .values()
            .filter(|d| metadata_matches(&d.metadata, filters))
            .cloned()
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn get(&self, document_id: &str) -> Result<Option<Document>, RagError> {
        Ok(self.documents.read().await.get(document_id).cloned())
    }

    async fn delete(&self, document_id: &str) -> Result<bool, RagError> {
        Ok(self.documents.write().await.remove(document_id).is_some())
    }

    async fn status(&self, document_id: &str) -> Result<ProcessingStatus, RagError> {
        self.documents
            .read()
            .await
            .get(document_id)
            .map(|d| d.status)
            .ok_or_else(|| RagError::DocumentNotFound(document_id.to_string()))
    }
}

/// Canned summaries assembled from the source documents.
#[derive(Debug, Default)]
pub struct MockSummaryProvider;

impl MockSummaryProvider {
    /// Create a mock summary provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SummaryProvider for MockSummaryProvider {
    async fn summarize(
        &self,
        documents: &[Document],
        request: &SummarizeRequest,
    ) -> Result<SummaryOutcome, RagError> {
        let combined: String = documents
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let mut text = match request.mode {
            SummaryMode::Extractive => combined,
            SummaryMode::Abstractive => format!("Summary of {} document(s): {combined}", documents.len()),
            SummaryMode::KeyPoints => documents
                .iter()
                .map(|d| format!("- {}", d.filename))
                .collect::<Vec<_>>()
                .join("\n"),
        };
        if text.len() > request.max_length {
            let mut cut = request.max_length;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }

        Ok(SummaryOutcome {
            text,
            confidence: 0.85,
            processing_time_ms: 1.0,
        })
    }
}
