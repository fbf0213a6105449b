use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level pipeline configuration. Each step carries its own model
/// parameters so temperature differentiation (near-zero for routing and
/// extraction, slightly higher for synthesis) is explicit wiring rather than
/// process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub router: RouterConfig,
    pub needle: NeedleConfig,
    pub summary: SummaryConfig,
    pub filter: FilterConfig,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub temperature: f32,
    pub max_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeedleConfig {
    /// Fine chunks requested per query.
    pub top_k: usize,
    /// Retrieved chunks scoring below this are discarded before extraction.
    pub similarity_threshold: f32,
    pub temperature: f32,
    pub max_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Coarse chunks requested per query. No similarity floor; the reduce
    /// step filters noise.
    pub top_k: usize,
    pub temperature: f32,
    /// Confidence reported for a non-null synthesized answer. Synthesis is
    /// inherently less certain than verbatim extraction, so this must stay
    /// strictly below 1.0.
    pub synthesis_confidence: f32,
    pub map_max_tokens: usize,
    pub reduce_max_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Multiplier applied to `k` before post-filtering. Must be > 1 so that
    /// filtering loss can be compensated.
    pub overfetch_factor: usize,
}

/// Upper bounds on external calls. Every retrieval, completion, and tool
/// invocation is awaited under one of these; there are no unbounded waits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub llm_secs: u64,
    pub retrieval_secs: u64,
    pub tool_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig {
                temperature: 0.0,
                max_tokens: 256,
            },
            needle: NeedleConfig {
                top_k: 3,
                similarity_threshold: 0.75,
                temperature: 0.0,
                max_tokens: 512,
            },
            summary: SummaryConfig {
                top_k: 15,
                temperature: 0.2,
                synthesis_confidence: 0.85,
                map_max_tokens: 256,
                reduce_max_tokens: 1024,
            },
            filter: FilterConfig {
                overfetch_factor: 3,
            },
            timeouts: TimeoutConfig {
                llm_secs: 60,
                retrieval_secs: 30,
                tool_secs: 10,
            },
        }
    }
}

impl PipelineConfig {
    /// Validate config values, returning errors for clearly broken
    /// configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.needle.top_k == 0 {
            return Err("needle.top_k must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.needle.similarity_threshold) {
            return Err("needle.similarity_threshold must be in [0.0, 1.0]".into());
        }
        if self.summary.top_k == 0 {
            return Err("summary.top_k must be > 0".into());
        }
        if self.summary.synthesis_confidence <= 0.0 || self.summary.synthesis_confidence >= 1.0 {
            return Err("summary.synthesis_confidence must be strictly between 0.0 and 1.0".into());
        }
        if self.filter.overfetch_factor <= 1 {
            return Err("filter.overfetch_factor must be > 1".into());
        }
        if self.timeouts.llm_secs == 0 || self.timeouts.retrieval_secs == 0 || self.timeouts.tool_secs == 0 {
            return Err("timeouts must be non-zero".into());
        }
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}
