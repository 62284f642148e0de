//! RAG domain layer and the version-1.0 protocol adapter.
//!
//! The protocol core treats the RAG domain as a set of collaborators
//! behind narrow interfaces. This crate holds those interfaces and the
//! pieces built on top of them:
//!
//! - [`domain`]: search, document and summarization models
//! - [`ports`]: async collaborator traits ([`ports::SearchProvider`],
//!   [`ports::DocumentStore`], [`ports::SummaryProvider`])
//! - [`service`]: [`service::RagService`], the coordinating domain service
//! - [`v1`]: [`v1::RagAdapterV1`], the version-1.0 tool adapter
//! - [`mock`]: in-memory providers for tests and demos

pub mod domain;
pub mod mock;
pub mod ports;
pub mod service;
pub mod v1;

pub use domain::{SearchMode, SearchQuery, SummarizeRequest, SummaryMode};
pub use ports::{DocumentStore, RagError, SearchProvider, SummaryProvider};
pub use service::RagService;
pub use v1::RagAdapterV1;
