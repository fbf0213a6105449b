//! Retrieval boundary.
//!
//! The vector index and its storage belong to the indexing layer; the query
//! pipeline sees only [`Retriever`]. Two instances are injected per
//! pipeline, one over fine chunks and one over coarse chunks, and
//! [`entity_filter`] wraps either one when a query names a specific claim.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::types::ScoredChunk;

pub mod entity_filter;

pub use entity_filter::{ClaimFilter, EntityFilteredRetriever};

/// Similarity search over one chunk granularity. Results are ordered by
/// descending similarity score; implementations must not return more than
/// `k` results.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>>;
}

/// Await a search call under an upper bound; a timeout is a retrieval
/// failure, never an indefinite wait.
pub async fn search_with_timeout(
    retriever: &dyn Retriever,
    query: &str,
    k: usize,
    timeout: Duration,
) -> Result<Vec<ScoredChunk>> {
    match tokio::time::timeout(timeout, retriever.search(query, k)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "retrieval timed out after {}s",
            timeout.as_secs()
        )),
    }
}
