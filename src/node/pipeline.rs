//! Pipeline orchestrating Extract -> Parse -> Dedup -> Validate

use crate::error::DecodeError;
use crate::node::dedup::dedupe;
use crate::node::extractor::LinkExtractor;
use crate::node::geo::GeoLocator;
use crate::node::models::Node;
use crate::node::parser::ConfigParser;
use crate::node::validator::{NodeValidator, ValidationStats};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

/// Raw text handed over by a content producer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    /// Provenance tag copied onto every node found in `text`
    pub source: String,
    pub text: String,
    pub observed_at: Option<DateTime<Utc>>,
}

impl SourceText {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
            observed_at: None,
        }
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = Some(at);
        self
    }
}

impl<S: Into<String>, T: Into<String>> From<(S, T)> for SourceText {
    fn from((source, text): (S, T)) -> Self {
        Self::new(source, text)
    }
}

/// Counters for one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub texts: usize,
    pub tokens: usize,
    pub parsed: usize,
    pub malformed: usize,
    pub invalid_field: usize,
    pub unique: usize,
    pub geo_enriched: usize,
    pub validation: ValidationStats,
}

/// Nodes returned by a run, in first-seen order, plus counters
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub nodes: Vec<Node>,
    pub stats: RunStats,
}

/// Extract, parse and deduplicate without touching the network.
///
/// Deterministic: the same inputs always give the same nodes.
pub fn collect_candidates(inputs: &[SourceText]) -> (Vec<Node>, RunStats) {
    let mut stats = RunStats {
        texts: inputs.len(),
        ..RunStats::default()
    };
    let mut nodes = Vec::new();

    for input in inputs {
        for token in LinkExtractor::extract(&input.text, &input.source) {
            stats.tokens += 1;
            let token = match input.observed_at {
                Some(at) => token.observed_at(at),
                None => token,
            };
            match ConfigParser::parse(&token) {
                Ok(node) => {
                    stats.parsed += 1;
                    nodes.push(node);
                }
                Err(e) => {
                    match e {
                        DecodeError::Malformed { .. } => stats.malformed += 1,
                        DecodeError::InvalidField { .. } => stats.invalid_field += 1,
                    }
                    debug!("Dropped {} token from {}: {}", token.scheme, input.source, e);
                }
            }
        }
    }

    let nodes = dedupe(nodes);
    stats.unique = nodes.len();
    info!(
        "Extracted {} tokens from {} texts: {} parsed, {} malformed, {} invalid, {} unique",
        stats.tokens, stats.texts, stats.parsed, stats.malformed, stats.invalid_field, stats.unique
    );
    (nodes, stats)
}

/// Runs the full pipeline
#[derive(Clone)]
pub struct Pipeline {
    validator: NodeValidator,
    geo: Option<GeoLocator>,
}

impl Pipeline {
    pub fn new(validator: NodeValidator) -> Self {
        Self {
            validator,
            geo: None,
        }
    }

    pub fn with_geo(mut self, geo: GeoLocator) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Candidates after dedup and optional GeoIP enrichment, not yet probed
    pub fn candidates(&self, inputs: &[SourceText]) -> (Vec<Node>, RunStats) {
        let (mut nodes, mut stats) = collect_candidates(inputs);
        if let Some(geo) = &self.geo {
            stats.geo_enriched = nodes
                .iter_mut()
                .map(|n| geo.enrich(n))
                .filter(|changed| *changed)
                .count();
        }
        (nodes, stats)
    }

    pub async fn run(&self, inputs: &[SourceText]) -> PipelineOutput {
        let (nodes, mut stats) = self.candidates(inputs);
        let nodes = self.validator.validate_all(nodes).await;
        stats.validation = ValidationStats::from_nodes(&nodes);
        PipelineOutput { nodes, stats }
    }

    /// Like [`run`](Self::run), with validation stopping on `shutdown`
    pub async fn run_with_shutdown(
        &self,
        inputs: &[SourceText],
        shutdown: watch::Receiver<bool>,
    ) -> PipelineOutput {
        let (nodes, mut stats) = self.candidates(inputs);
        let nodes = self
            .validator
            .validate_all_with_shutdown(nodes, shutdown)
            .await;
        stats.validation = ValidationStats::from_nodes(&nodes);
        PipelineOutput { nodes, stats }
    }
}
