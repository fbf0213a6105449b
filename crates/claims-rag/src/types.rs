use serde::{Deserialize, Serialize};

/// Chunk granularity. Fine chunks are small units tuned for precise fact
/// lookup; coarse chunks are larger units tuned for broad context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Fine,
    Coarse,
}

/// A retrievable unit of text. Chunks are built offline by the indexing
/// layer and are immutable at query time; each chunk belongs to exactly one
/// claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub granularity: Granularity,
    /// Claim number this chunk belongs to (e.g. "5").
    pub entity_id: Option<String>,
    /// Claimant name this chunk belongs to (e.g. "Jon Mor").
    pub entity_name: Option<String>,
    /// Ordinal of the chunk within its source document.
    pub position: usize,
    /// For fine chunks, the id of the coarse chunk that contains them.
    pub parent_id: Option<String>,
}

/// A chunk plus the similarity score a single retrieval call assigned to it.
/// Created per query, discarded once the strategy has consumed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// The two processing strategies a query can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Precise single-fact extraction over fine chunks.
    Needle,
    /// Map-reduce synthesis over coarse chunks.
    Summary,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Needle => "needle",
            Self::Summary => "summary",
        }
    }
}

/// The router's classification of a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub strategy: Strategy,
    /// Model-reported certainty in [0, 1].
    pub confidence: f32,
    pub rationale: String,
}

/// Parent linkage for a fine chunk that contributed to a needle answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkLink {
    pub chunk_id: String,
    pub parent_id: Option<String>,
}

/// Record of a summary strategy's map/reduce pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapReduceTrace {
    /// Chunks retrieved for the map phase.
    pub total_chunks: usize,
    /// Chunks that produced a non-empty mini-summary.
    pub mapped: usize,
    /// Chunks skipped as irrelevant or failed.
    pub skipped: usize,
    pub reduce_description: String,
}

/// What a strategy produced for one query. `answer = None` means "the corpus
/// does not contain this fact" and is a legitimate terminal state, never an
/// error; the rationale always explains why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: Option<String>,
    pub confidence: f32,
    /// Ids of the chunks the answer is grounded in, in retrieval order.
    pub sources: Vec<String>,
    pub rationale: String,
    /// Name of the deterministic tool, if one was invoked.
    pub tool_used: Option<String>,
    /// Ids of every chunk the strategy retrieved (sources are a subset).
    pub retrieved_ids: Vec<String>,
    /// Texts of every retrieved chunk, for downstream evaluation.
    pub retrieved_chunks: Vec<String>,
    /// Fine-to-coarse linkage of the chunks behind a needle answer.
    pub hierarchy: Vec<ChunkLink>,
    pub map_trace: Option<MapReduceTrace>,
}

impl AnswerResult {
    /// A null answer with zero confidence and an explanatory rationale.
    pub fn not_found(rationale: impl Into<String>) -> Self {
        Self {
            answer: None,
            confidence: 0.0,
            sources: Vec::new(),
            rationale: rationale.into(),
            tool_used: None,
            retrieved_ids: Vec::new(),
            retrieved_chunks: Vec::new(),
            hierarchy: Vec::new(),
            map_trace: None,
        }
    }

    pub fn with_retrieved(mut self, retrieved: &[ScoredChunk]) -> Self {
        self.retrieved_ids = retrieved.iter().map(|sc| sc.chunk.id.clone()).collect();
        self.retrieved_chunks = retrieved.iter().map(|sc| sc.chunk.text.clone()).collect();
        self
    }
}

/// The pipeline's external contract: the routing decision merged with the
/// executing strategy's result. Created fresh per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub strategy: Strategy,
    pub answer: Option<String>,
    pub confidence: f32,
    pub sources: Vec<String>,
    pub retrieved_chunks: Vec<String>,
    pub rationale: String,
    pub tool_used: Option<String>,
    pub hierarchy: Vec<ChunkLink>,
    pub map_trace: Option<MapReduceTrace>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_has_rationale_and_zero_confidence() {
        let result = AnswerResult::not_found("no chunk met similarity threshold");
        assert!(result.answer.is_none());
        assert_eq!(result.confidence, 0.0);
        assert!(!result.rationale.is_empty());
    }

    #[test]
    fn test_strategy_serde_roundtrip() {
        let json = serde_json::to_string(&Strategy::Needle).unwrap();
        assert_eq!(json, "\"needle\"");
        let back: Strategy = serde_json::from_str("\"summary\"").unwrap();
        assert_eq!(back, Strategy::Summary);
    }

    #[test]
    fn test_with_retrieved_copies_ids_and_texts() {
        let chunks = vec![ScoredChunk {
            chunk: Chunk {
                id: "c1".into(),
                text: "Phone: 555-1234".into(),
                granularity: Granularity::Fine,
                entity_id: Some("1".into()),
                entity_name: Some("Jon Mor".into()),
                position: 0,
                parent_id: Some("p1".into()),
            },
            score: 0.9,
        }];
        let result = AnswerResult::not_found("x").with_retrieved(&chunks);
        assert_eq!(result.retrieved_ids, vec!["c1"]);
        assert_eq!(result.retrieved_chunks, vec!["Phone: 555-1234"]);
    }
}
