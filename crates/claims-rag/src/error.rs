//! Pipeline error taxonomy.
//!
//! Only failures that mean "the pipeline itself malfunctioned" surface as
//! errors. Failures that mean "the corpus does not contain this information"
//! (a failed extraction, a failed tool call, zero retrieved chunks) are
//! absorbed into a null-answer [`AnswerResult`](crate::types::AnswerResult)
//! whose rationale discloses the cause, so callers can always distinguish
//! "no such fact" from "the system is broken".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The classification step could not produce a valid decision, even
    /// after one retry. Never silently defaulted to a route.
    #[error("routing failed: {0}")]
    Routing(#[source] anyhow::Error),

    /// The underlying search call errored or timed out.
    #[error("retrieval failed: {0}")]
    Retrieval(#[source] anyhow::Error),

    /// State contradicting a design invariant, e.g. a strategy reporting
    /// sources it never retrieved. Indicates a defect, not a runtime
    /// condition; always fatal.
    #[error("pipeline invariant violated: {0}")]
    Invariant(String),
}
