//! VPN Harvest - share-link extraction and node validation
//!
//! Turns noisy text (chat archives, repository pages, web pages) into a
//! deduplicated set of proxy/VPN nodes and checks which of them are live.

pub mod error;
pub mod logging;
pub mod node;
pub mod settings;

pub use error::{DecodeError, PoolConfigurationError, ProbeError};
pub use node::*;
pub use settings::AppConfig;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
