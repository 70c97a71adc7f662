//! Node module for extracting, parsing and validating share links
//!
//! This module provides functionality for:
//! - Finding vmess/vless/trojan/ss/ssr links in arbitrary text
//! - Decoding each link into a canonical node
//! - Deduplicating nodes across sources
//! - Probing nodes concurrently with bounded parallelism

pub mod dedup;
pub mod extractor;
pub mod geo;
pub mod models;
pub mod parser;
pub mod payload;
pub mod pipeline;
pub mod validator;

pub use dedup::dedupe;
pub use extractor::LinkExtractor;
pub use geo::{GeoLocation, GeoLocator};
pub use models::{AuthIdentity, Node, NodeMetadata, NodeStatus, Protocol, RawToken, TlsTarget};
pub use parser::ConfigParser;
pub use payload::{HealthPolicy, NodePayload};
pub use pipeline::{collect_candidates, Pipeline, PipelineOutput, RunStats, SourceText};
pub use validator::{NodeValidator, Probe, TcpProbe, ValidationStats, ValidatorConfig};
