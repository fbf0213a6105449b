//! Pipeline coordinator.
//!
//! The single entry point for answering a question. The coordinator holds no
//! domain logic: it extracts the claim filter, asks the router for a
//! strategy, dispatches to that strategy with the appropriately wrapped
//! retriever, and merges the results into one [`Response`]. It keeps no
//! state between calls and is safe to share across concurrent queries.

use anyhow::anyhow;
use std::sync::Arc;

use crate::agents::{NeedleAgent, RouterAgent, SummaryAgent};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::llm::LLMClient;
use crate::retrieval::{ClaimFilter, EntityFilteredRetriever, Retriever};
use crate::tools::ToolRegistry;
use crate::types::{AnswerResult, Response, Strategy};

pub struct QueryPipeline {
    router: RouterAgent,
    needle: NeedleAgent,
    summary: SummaryAgent,
    fine_retriever: Arc<dyn Retriever>,
    coarse_retriever: Arc<dyn Retriever>,
    overfetch_factor: usize,
}

impl QueryPipeline {
    /// Wire a pipeline from its collaborators. The retrieval engine and the
    /// model client are injected; the coordinator never builds either.
    pub fn new(
        llm: Arc<dyn LLMClient>,
        fine_retriever: Arc<dyn Retriever>,
        coarse_retriever: Arc<dyn Retriever>,
        config: PipelineConfig,
    ) -> anyhow::Result<Self> {
        config.validate().map_err(|e| anyhow!("invalid pipeline config: {}", e))?;

        let tools = Arc::new(ToolRegistry::new());
        Ok(Self {
            router: RouterAgent::new(llm.clone(), config.router, &config.timeouts),
            needle: NeedleAgent::new(llm.clone(), tools.clone(), config.needle, &config.timeouts),
            summary: SummaryAgent::new(llm, tools, config.summary, &config.timeouts),
            fine_retriever,
            coarse_retriever,
            overfetch_factor: config.filter.overfetch_factor,
        })
    }

    /// Answer one question. Routing and retrieval failures surface as
    /// errors; an absent fact comes back as a null answer with a rationale.
    pub async fn answer(&self, question: &str) -> Result<Response, PipelineError> {
        tracing::info!(question = %question, "Pipeline started");

        // When the query names a claim, both retrievers are wrapped so that
        // no strategy can see another claim's chunks.
        let filter = ClaimFilter::from_query(question);
        let (fine, coarse) = self.scoped_retrievers(&filter);

        let decision = self.router.route(question).await?;

        let result = match decision.strategy {
            Strategy::Needle => self.needle.answer(question, fine.as_ref()).await?,
            Strategy::Summary => self.summary.answer(question, coarse.as_ref()).await?,
        };

        verify_sources(&result)?;

        let response = Response {
            strategy: decision.strategy,
            answer: result.answer,
            confidence: result.confidence,
            sources: result.sources,
            retrieved_chunks: result.retrieved_chunks,
            rationale: result.rationale,
            tool_used: result.tool_used,
            hierarchy: result.hierarchy,
            map_trace: result.map_trace,
        };

        tracing::info!(
            strategy = response.strategy.as_str(),
            answered = response.answer.is_some(),
            confidence = response.confidence,
            sources = response.sources.len(),
            "Pipeline completed"
        );
        Ok(response)
    }

    fn scoped_retrievers(&self, filter: &ClaimFilter) -> (Arc<dyn Retriever>, Arc<dyn Retriever>) {
        if !filter.is_active() {
            return (self.fine_retriever.clone(), self.coarse_retriever.clone());
        }
        (
            Arc::new(EntityFilteredRetriever::new(
                self.fine_retriever.clone(),
                filter.clone(),
                self.overfetch_factor,
            )),
            Arc::new(EntityFilteredRetriever::new(
                self.coarse_retriever.clone(),
                filter.clone(),
                self.overfetch_factor,
            )),
        )
    }
}

/// A strategy may only cite chunks it retrieved. A violation here means a
/// defect in an agent or retriever wrapper, not a runtime condition.
fn verify_sources(result: &AnswerResult) -> Result<(), PipelineError> {
    for source in &result.sources {
        if !result.retrieved_ids.iter().any(|id| id == source) {
            return Err(PipelineError::Invariant(format!(
                "strategy cited chunk '{}' it never retrieved",
                source
            )));
        }
    }
    Ok(())
}
