//! claims-rag: entity-aware RAG query pipeline for multi-claim insurance
//! documents.
//!
//! Each question is classified into one of two strategies: needle
//! (precise single-fact extraction over fine chunks) or summary (map-reduce
//! synthesis over coarse chunks). Queries naming a specific claim are
//! scoped to that claim by post-filtering retrieval results, and exact date
//! arithmetic is delegated to a deterministic tool the model can invoke but
//! never reimplements. Every answer is grounded in retrieved text; "the
//! corpus does not contain this fact" is a first-class outcome.
//!
//! Ingestion, chunking, embedding, and the vector index are upstream
//! concerns: the pipeline consumes them through the [`retrieval::Retriever`]
//! and [`llm::LLMClient`] traits.

pub mod agents;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod retrieval;
pub mod structured;
pub mod tools;
pub mod types;

// Re-export primary types for convenience
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::QueryPipeline;
pub use types::{
    AnswerResult, Chunk, ChunkLink, Granularity, MapReduceTrace, Response, RouteDecision,
    ScoredChunk, Strategy,
};

// Re-export common types
pub use anyhow::{Error, Result};
