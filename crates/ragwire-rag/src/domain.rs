//! Protocol-agnostic domain model for RAG operations.
//!
//! These types are the vocabulary shared between the v1 adapter, the
//! domain service and the collaborator ports. Nothing in here knows about
//! the wire protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// How a search should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Vector-similarity search.
    Semantic,
    /// Term-match search.
    Keyword,
    /// Semantic and keyword results merged by score.
    Hybrid,
}

impl SearchMode {
    /// Parse a mode name; returns `None` for unknown modes.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "semantic" => Some(Self::Semantic),
            "keyword" => Some(Self::Keyword),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }

    /// The wire name of this mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Keyword => "keyword",
            Self::Hybrid => "hybrid",
        }
    }
}

/// What kind of unit a search result points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchResultKind {
    /// A whole document.
    Document,
    /// A chunk of a document.
    Chunk,
    /// A generated summary.
    Summary,
}

impl SearchResultKind {
    /// The wire name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Chunk => "chunk",
            Self::Summary => "summary",
        }
    }
}

/// Processing state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Queued, not yet started.
    Pending,
    /// Extraction/indexing in progress.
    Processing,
    /// Fully indexed.
    Completed,
    /// Processing failed.
    Failed,
}

impl ProcessingStatus {
    /// The wire name of this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// A search request with all its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Query text.
    pub query: String,
    /// Maximum number of results.
    pub limit: usize,
    /// Minimum similarity score for a result to be kept.
    pub threshold: f64,
    /// Search strategy.
    pub mode: SearchMode,
    /// Additional provider-specific filters.
    pub filters: Option<Value>,
}

impl SearchQuery {
    /// A query with the protocol defaults (limit 10, threshold 0.7,
    /// semantic mode).
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: 10,
            threshold: 0.7,
            mode: SearchMode::Semantic,
            filters: None,
        }
    }

    /// Set the result limit.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the score threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the search mode.
    #[must_use]
    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result identifier.
    pub id: String,
    /// Matched content.
    pub content: String,
    /// Provider metadata.
    pub metadata: Value,
    /// Similarity score in `[0, 1]`.
    pub score: f64,
    /// What this result points at.
    pub kind: SearchResultKind,
    /// Owning document, when the result is a chunk.
    pub document_id: Option<String>,
    /// Chunk position within the document.
    pub chunk_index: Option<usize>,
}

/// A complete search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Ranked results, best first.
    pub results: Vec<SearchResult>,
    /// The query that produced them.
    pub query: SearchQuery,
    /// Number of results returned.
    pub total_results: usize,
    /// Wall-clock search time.
    pub processing_time_ms: f64,
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique document id.
    pub id: Uuid,
    /// Original filename.
    pub filename: String,
    /// Extracted text content.
    pub content: String,
    /// Caller-supplied metadata.
    pub metadata: Value,
    /// When the document was uploaded.
    pub created_at: DateTime<Utc>,
    /// When the document was last modified.
    pub updated_at: DateTime<Utc>,
    /// Processing state.
    pub status: ProcessingStatus,
    /// SHA-256 hash of the raw content.
    pub content_hash: String,
    /// Raw content size.
    pub size_bytes: usize,
}

/// What kind of summary to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryMode {
    /// Sentences selected from the source.
    Extractive,
    /// Newly generated prose.
    Abstractive,
    /// Bulleted key points.
    KeyPoints,
}

impl SummaryMode {
    /// Parse a mode name; returns `None` for unknown modes.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "extractive" => Some(Self::Extractive),
            "abstractive" => Some(Self::Abstractive),
            "key_points" => Some(Self::KeyPoints),
            _ => None,
        }
    }

    /// The wire name of this mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extractive => "extractive",
            Self::Abstractive => "abstractive",
            Self::KeyPoints => "key_points",
        }
    }
}

/// Whether a metadata document satisfies a filter object.
///
/// Every filter key must be present in the metadata with an equal value;
/// a missing key fails the match. `None` or a non-object filter matches
/// everything.
#[must_use]
pub fn metadata_matches(metadata: &Value, filters: Option<&Value>) -> bool {
    let Some(filters) = filters.and_then(Value::as_object) else {
        return true;
    };
    filters
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}

/// A summarization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizeRequest {
    /// Documents to summarize.
    pub document_ids: Vec<String>,
    /// Summary style.
    pub mode: SummaryMode,
    /// Maximum summary length in characters.
    pub max_length: usize,
    /// Summary language.
    pub language: String,
}

impl SummarizeRequest {
    /// A request with the protocol defaults (extractive, 500 chars, "en").
    #[must_use]
    pub fn new(document_ids: Vec<String>) -> Self {
        Self {
            document_ids,
            mode: SummaryMode::Extractive,
            max_length: 500,
            language: "en".to_string(),
        }
    }
}

/// A complete summarization response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponse {
    /// The generated summary.
    pub summary: String,
    /// Documents the summary was produced from.
    pub source_documents: Vec<String>,
    /// Summary style used.
    pub mode: SummaryMode,
    /// Provider confidence in `[0, 1]`.
    pub confidence: f64,
    /// Wall-clock summarization time.
    pub processing_time_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_mode_names_round_trip() {
        for mode in [SearchMode::Semantic, SearchMode::Keyword, SearchMode::Hybrid] {
            assert_eq!(SearchMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(SearchMode::parse("fuzzy"), None);
    }

    #[test]
    fn summary_mode_names_round_trip() {
        for mode in [
            SummaryMode::Extractive,
            SummaryMode::Abstractive,
            SummaryMode::KeyPoints,
        ] {
            assert_eq!(SummaryMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(SummaryMode::parse("tl_dr"), None);
    }

    #[test]
    fn query_defaults() {
        let query = SearchQuery::new("rust");
        assert_eq!(query.limit, 10);
        assert_eq!(query.threshold, 0.7);
        assert_eq!(query.mode, SearchMode::Semantic);
        assert!(query.filters.is_none());
    }

    #[test]
    fn metadata_matching() {
        use serde_json::json;

        let metadata = json!({"team": "search", "lang": "en"});
        assert!(metadata_matches(&metadata, None));
        assert!(metadata_matches(&metadata, Some(&json!({}))));
        assert!(metadata_matches(&metadata, Some(&json!({"team": "search"}))));
        assert!(metadata_matches(
            &metadata,
            Some(&json!({"team": "search", "lang": "en"}))
        ));
        // Wrong value fails
        assert!(!metadata_matches(&metadata, Some(&json!({"team": "docs"}))));
        // Missing key fails
        assert!(!metadata_matches(&metadata, Some(&json!({"owner": "ops"}))));
    }
}
