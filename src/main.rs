use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use vpn_harvest::{
    collect_candidates, logging::init_logging, AppConfig, GeoLocator, NodePayload, NodeValidator,
    Pipeline, RunStats, SourceText,
};

/// Extract proxy/VPN share links from text and check which nodes are live
#[derive(Parser)]
#[command(name = "vpn-harvest")]
#[command(about = "Extract proxy/VPN share links from text and check which nodes are live")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, parse and deduplicate nodes without probing them
    Extract {
        /// Text files to scan; each path is used as the source tag
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Run the full pipeline and decide which nodes to publish or delete
    Check {
        /// Text files to scan; each path is used as the source tag
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Probe timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Number of concurrent probes
        #[arg(short = 'n', long)]
        parallel: Option<usize>,
        /// Skip certificate verification during TLS probes
        #[arg(long)]
        insecure: bool,
        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Result of `check`, ready for the publishing and deletion collaborators
#[derive(Serialize)]
struct CheckReport {
    publish: Vec<NodePayload>,
    delete: Vec<String>,
    stats: RunStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("failed to load configuration")?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level, config.log_file.as_deref().map(Path::new))?;

    match cli.command {
        Commands::Extract { inputs } => {
            let texts = read_inputs(&inputs)?;
            let (nodes, stats) = collect_candidates(&texts);
            for node in &nodes {
                println!("{}", serde_json::to_string(node)?);
            }
            info!("{} unique nodes from {} tokens", stats.unique, stats.tokens);
        }
        Commands::Check {
            inputs,
            timeout,
            parallel,
            insecure,
            output,
        } => {
            let mut validator_config = config.validator_config();
            if let Some(timeout) = timeout {
                validator_config = validator_config.with_timeout(Duration::from_secs(timeout));
            }
            if let Some(parallel) = parallel {
                validator_config = validator_config.with_parallelism(parallel);
            }
            if insecure {
                validator_config = validator_config.with_verify_ssl(false);
            }

            let validator = NodeValidator::new(validator_config)?;
            let mut pipeline = Pipeline::new(validator);
            if let Some(path) = &config.geoip_db {
                match GeoLocator::from_path(path) {
                    Ok(geo) => pipeline = pipeline.with_geo(geo),
                    Err(e) => warn!("GeoIP database {} unavailable: {}", path, e),
                }
            }

            let texts = read_inputs(&inputs)?;
            let result = pipeline.run(&texts).await;

            let (publish, delete) = config.health_policy().partition(&result.nodes);
            info!(
                "Healthy nodes: {}, nodes to delete: {}",
                publish.len(),
                delete.len()
            );
            let report = CheckReport {
                publish: publish.into_iter().map(NodePayload::from).collect(),
                delete,
                stats: result.stats,
            };

            let json = serde_json::to_string_pretty(&report)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {:?}", path))?;
                    info!("Saved report to {:?}", path);
                }
                None => println!("{}", json),
            }
        }
    }

    Ok(())
}

fn read_inputs(paths: &[PathBuf]) -> Result<Vec<SourceText>> {
    paths
        .iter()
        .map(|path| {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {:?}", path))?;
            Ok(SourceText::new(path.display().to_string(), text))
        })
        .collect()
}
