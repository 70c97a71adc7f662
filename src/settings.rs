//! Process-wide settings, read once at start

use crate::node::payload::HealthPolicy;
use crate::node::validator::ValidatorConfig;
use crate::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Optional settings file, any format the `config` crate understands
const SETTINGS_FILE: &str = "vpn-harvest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Probe timeout in seconds
    pub vpn_validator_timeout: u64,
    /// Number of concurrent probes
    pub vpn_validator_parallel: usize,
    pub verify_ssl: bool,
    pub max_ping_ms: u64,
    pub max_load: u8,
    /// MaxMind country database used to fill missing countries
    pub geoip_db: Option<String>,
    pub log_level: String,
    pub log_file: Option<String>,
}

impl AppConfig {
    /// Defaults, then `vpn-harvest.{toml,json,yaml,..}` if present, then the environment
    pub fn load() -> Result<Self> {
        Self::from_sources(Environment::default().try_parsing(true))
    }

    fn from_sources(env: Environment) -> Result<Self> {
        let config = Config::builder()
            .set_default("vpn_validator_timeout", 5)?
            .set_default("vpn_validator_parallel", 20)?
            .set_default("verify_ssl", true)?
            .set_default("max_ping_ms", 500)?
            .set_default("max_load", 90)?
            .set_default("log_level", "info")?
            .add_source(File::with_name(SETTINGS_FILE).required(false))
            .add_source(env)
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig::new()
            .with_timeout(Duration::from_secs(self.vpn_validator_timeout))
            .with_parallelism(self.vpn_validator_parallel)
            .with_verify_ssl(self.verify_ssl)
    }

    pub fn health_policy(&self) -> HealthPolicy {
        HealthPolicy::new(self.max_ping_ms, self.max_load)
    }
}
