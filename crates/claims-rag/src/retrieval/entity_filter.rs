//! Claim-scoped post-filtering of retrieval results.
//!
//! The vector index has no native metadata filtering, so when a query names
//! a specific claim (by number or by claimant name) we retrieve more results
//! than needed and drop every chunk belonging to a different claim. An empty
//! filtered result is returned as-is: a missing answer beats a confidently
//! wrong cross-claim answer.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};

use super::Retriever;
use crate::types::{Chunk, ScoredChunk};

static CLAIM_NUMBER_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)claim\s+number\s+(\d+)",
        r"(?i)claim\s*#\s*(\d+)",
        r"(?i)form\s+number\s+(\d+)",
        r"(?i)form\s*#\s*(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("claim number pattern is valid"))
    .collect()
});

/// Two to three consecutive capitalized words, e.g. "Jon Mor", "Lior Avraham".
/// The two-word minimum keeps a lone sentence-initial capital from matching.
static CLAIMANT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,2})\b").expect("name pattern is valid")
});

/// Capitalized words that belong to form fields, not to people. A candidate
/// name containing any of these is rejected.
const FIELD_KEYWORDS: &[&str] = &[
    "Date", "Incident", "Repair", "Appointment", "Account", "Number", "Phone", "Email",
    "Address", "Location", "Vehicle", "VIN", "License", "Plate", "Make", "Model", "Year",
    "Claim", "Form", "Summarize", "What", "When", "Where", "Who", "How", "Why", "Which",
    "List", "Compare", "Describe",
];

/// Claim identifiers extracted from a query. When both a number and a name
/// are found they combine with OR semantics: a chunk matching either
/// qualifies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimFilter {
    pub claim_number: Option<String>,
    pub claimant_name: Option<String>,
}

impl ClaimFilter {
    /// Extract claim identifiers from raw query text. Extraction is
    /// best-effort: a query naming no claim yields an inactive filter and
    /// retrieval stays unfiltered.
    pub fn from_query(query: &str) -> Self {
        let filter = Self {
            claim_number: extract_claim_number(query),
            claimant_name: extract_claimant_name(query),
        };
        if filter.is_active() {
            tracing::info!(
                claim_number = ?filter.claim_number,
                claimant_name = ?filter.claimant_name,
                "Claim filter active"
            );
        }
        filter
    }

    pub fn is_active(&self) -> bool {
        self.claim_number.is_some() || self.claimant_name.is_some()
    }

    /// Whether a chunk belongs to the claim this filter names. Claim numbers
    /// match exactly; claimant names match case-insensitively.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if let (Some(number), Some(entity_id)) = (&self.claim_number, &chunk.entity_id) {
            if number == entity_id {
                return true;
            }
        }
        if let (Some(name), Some(entity_name)) = (&self.claimant_name, &chunk.entity_name) {
            if name.eq_ignore_ascii_case(entity_name) {
                return true;
            }
        }
        false
    }
}

fn extract_claim_number(query: &str) -> Option<String> {
    CLAIM_NUMBER_RES
        .iter()
        .find_map(|re| re.captures(query).map(|c| c[1].to_string()))
}

fn extract_claimant_name(query: &str) -> Option<String> {
    for captures in CLAIMANT_NAME_RE.captures_iter(query) {
        let candidate = captures[1].trim().to_string();
        if candidate.split_whitespace().all(|w| !FIELD_KEYWORDS.contains(&w)) {
            return Some(candidate);
        }
    }
    None
}

/// Wraps a retriever with overfetch-then-filter so that queries naming a
/// specific claim never see chunks from another claim.
pub struct EntityFilteredRetriever {
    inner: Arc<dyn Retriever>,
    filter: ClaimFilter,
    /// Overfetch multiplier, > 1 to compensate for filtering loss.
    overfetch_factor: usize,
}

impl EntityFilteredRetriever {
    pub fn new(inner: Arc<dyn Retriever>, filter: ClaimFilter, overfetch_factor: usize) -> Self {
        debug_assert!(overfetch_factor > 1, "overfetch factor must exceed 1");
        Self {
            inner,
            filter,
            overfetch_factor,
        }
    }
}

#[async_trait]
impl Retriever for EntityFilteredRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let candidates = self.inner.search(query, k * self.overfetch_factor).await?;
        let total = candidates.len();

        // Similarity order is preserved: filtering only removes entries.
        let mut matched: Vec<ScoredChunk> = candidates
            .into_iter()
            .filter(|sc| self.filter.matches(&sc.chunk))
            .collect();
        matched.truncate(k);

        tracing::debug!(
            requested = k,
            overfetched = total,
            kept = matched.len(),
            "Post-filtered retrieval"
        );

        // An empty result is final; there is no fallback to unfiltered
        // results.
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Granularity;

    fn chunk(id: &str, entity_id: Option<&str>, entity_name: Option<&str>) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: format!("text of {}", id),
            granularity: Granularity::Fine,
            entity_id: entity_id.map(String::from),
            entity_name: entity_name.map(String::from),
            position: 0,
            parent_id: None,
        }
    }

    struct FixedRetriever {
        results: Vec<ScoredChunk>,
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn search(&self, _query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
            Ok(self.results.iter().take(k).cloned().collect())
        }
    }

    #[test]
    fn test_extract_claim_number_variants() {
        assert_eq!(extract_claim_number("summarize claim number 5"), Some("5".into()));
        assert_eq!(extract_claim_number("what happened in claim #12?"), Some("12".into()));
        assert_eq!(extract_claim_number("see FORM #3"), Some("3".into()));
        assert_eq!(extract_claim_number("form number 7 details"), Some("7".into()));
        assert_eq!(extract_claim_number("how many claims are there?"), None);
    }

    #[test]
    fn test_extract_claimant_name_bigram() {
        assert_eq!(
            extract_claimant_name("What is Jon Mor's phone number?"),
            Some("Jon Mor".into())
        );
        assert_eq!(
            extract_claimant_name("Tell me about Lior Avraham Cohen"),
            Some("Lior Avraham Cohen".into())
        );
    }

    #[test]
    fn test_extract_claimant_name_rejects_field_keywords() {
        assert_eq!(extract_claimant_name("What is the Incident Date?"), None);
        assert_eq!(extract_claimant_name("Show the Vehicle Model"), None);
    }

    #[test]
    fn test_extract_claimant_name_absent_for_codes() {
        // A typo'd or code-like identifier matches neither pattern, so the
        // filter stays inactive and retrieval is unfiltered.
        let filter = ClaimFilter::from_query("What is XYZ123's phone?");
        assert!(!filter.is_active());
    }

    #[test]
    fn test_filter_or_semantics() {
        let filter = ClaimFilter {
            claim_number: Some("5".into()),
            claimant_name: Some("Jon Mor".into()),
        };
        assert!(filter.matches(&chunk("a", Some("5"), Some("Jane Smith"))));
        assert!(filter.matches(&chunk("b", Some("2"), Some("Jon Mor"))));
        assert!(!filter.matches(&chunk("c", Some("2"), Some("Jane Smith"))));
    }

    #[test]
    fn test_name_match_is_case_insensitive() {
        let filter = ClaimFilter {
            claim_number: None,
            claimant_name: Some("jon mor".into()),
        };
        assert!(filter.matches(&chunk("a", None, Some("Jon Mor"))));
    }

    #[tokio::test]
    async fn test_filtered_search_preserves_order_and_caps_at_k() {
        let results = vec![
            ScoredChunk { chunk: chunk("a", Some("5"), None), score: 0.95 },
            ScoredChunk { chunk: chunk("b", Some("2"), None), score: 0.90 },
            ScoredChunk { chunk: chunk("c", Some("5"), None), score: 0.85 },
            ScoredChunk { chunk: chunk("d", Some("5"), None), score: 0.80 },
            ScoredChunk { chunk: chunk("e", Some("5"), None), score: 0.75 },
        ];
        let filter = ClaimFilter { claim_number: Some("5".into()), claimant_name: None };
        let retriever =
            EntityFilteredRetriever::new(Arc::new(FixedRetriever { results }), filter, 3);

        let out = retriever.search("anything", 2).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].chunk.id, "a");
        assert_eq!(out[1].chunk.id, "c");
    }

    #[tokio::test]
    async fn test_filtered_search_empty_when_nothing_matches() {
        let results = vec![
            ScoredChunk { chunk: chunk("a", Some("2"), Some("Jane Smith")), score: 0.95 },
            ScoredChunk { chunk: chunk("b", Some("3"), Some("David Ross")), score: 0.90 },
        ];
        let filter = ClaimFilter { claim_number: Some("5".into()), claimant_name: None };
        let retriever =
            EntityFilteredRetriever::new(Arc::new(FixedRetriever { results }), filter, 3);

        let out = retriever.search("anything", 5).await.unwrap();
        assert!(out.is_empty());
    }
}
