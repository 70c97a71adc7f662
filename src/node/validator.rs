//! Node validator for probing candidate nodes concurrently
//!
//! A fixed pool of `parallelism` workers drains a shared queue, one node at a
//! time, so no more than `parallelism` probes are ever in flight. Every probe
//! is bounded by the configured timeout, which puts the worst-case wall time
//! of a pass at `ceil(nodes / parallelism) * timeout`. Results are written back
//! to the slot of their input position.

use crate::error::{PoolConfigurationError, ProbeError};
use crate::node::models::{Node, NodeStatus};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use native_tls::TlsConnector as NativeTlsConnector;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio_native_tls::TlsConnector as TokioTlsConnector;
use tracing::{debug, info, warn};

/// Default timeout for a single probe in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Default number of concurrent probes
const DEFAULT_PARALLELISM: usize = 20;

/// Configuration for the node validator
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Upper bound for each probe
    pub timeout: Duration,
    /// Number of workers, a hard ceiling on concurrent probes
    pub parallelism: usize,
    /// Verify certificates during TLS handshakes
    pub verify_ssl: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            parallelism: DEFAULT_PARALLELISM,
            verify_ssl: true,
        }
    }
}

impl ValidatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    fn check(&self) -> Result<(), PoolConfigurationError> {
        if self.parallelism == 0 {
            return Err(PoolConfigurationError::NonPositiveParallelism(
                self.parallelism,
            ));
        }
        if self.timeout.is_zero() {
            return Err(PoolConfigurationError::ZeroTimeout);
        }
        Ok(())
    }
}

/// A single bounded attempt to reach a node
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, node: &Node) -> Result<(), ProbeError>;
}

/// TCP connect, followed by a TLS handshake when the node uses TLS
#[derive(Debug, Clone)]
pub struct TcpProbe {
    verify_ssl: bool,
}

impl TcpProbe {
    pub fn new(verify_ssl: bool) -> Self {
        Self { verify_ssl }
    }

    fn check_host(host: &str) -> Result<(), ProbeError> {
        let valid = !host.is_empty()
            && host
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '_'));
        if valid {
            Ok(())
        } else {
            Err(ProbeError::InvalidTarget(format!("bad host {:?}", host)))
        }
    }

    async fn connect(&self, node: &Node) -> Result<TcpStream, ProbeError> {
        Self::check_host(&node.host)?;
        let addrs: Vec<_> = lookup_host((node.host.as_str(), node.port))
            .await
            .map_err(|e| ProbeError::InvalidTarget(e.to_string()))?
            .collect();
        if addrs.is_empty() {
            return Err(ProbeError::InvalidTarget(format!(
                "{} resolved to no addresses",
                node.host
            )));
        }

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }
        Err(ProbeError::ConnectionRefused(
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, node: &Node) -> Result<(), ProbeError> {
        let stream = self.connect(node).await?;

        let Some(tls) = &node.tls else {
            return Ok(());
        };
        let connector = NativeTlsConnector::builder()
            .danger_accept_invalid_certs(!self.verify_ssl)
            .danger_accept_invalid_hostnames(!self.verify_ssl)
            .build()
            .map_err(|e| ProbeError::HandshakeFailed(e.to_string()))?;
        let domain = tls.server_name.as_deref().unwrap_or(&node.host);
        TokioTlsConnector::from(connector)
            .connect(domain, stream)
            .await
            .map_err(|e| ProbeError::HandshakeFailed(e.to_string()))?;
        Ok(())
    }
}

/// Status counts for one validation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationStats {
    pub healthy: usize,
    pub unreachable: usize,
    pub invalid: usize,
    pub unvalidated: usize,
}

impl ValidationStats {
    pub fn from_nodes(nodes: &[Node]) -> Self {
        nodes.iter().fold(Self::default(), |mut stats, node| {
            match node.status {
                NodeStatus::Healthy => stats.healthy += 1,
                NodeStatus::Unreachable => stats.unreachable += 1,
                NodeStatus::Invalid => stats.invalid += 1,
                NodeStatus::Unvalidated => stats.unvalidated += 1,
            }
            stats
        })
    }
}

/// Validates nodes with a bounded worker pool
#[derive(Clone)]
pub struct NodeValidator {
    config: ValidatorConfig,
    probe: Arc<dyn Probe>,
}

impl NodeValidator {
    /// Create a validator using the TCP/TLS probe
    pub fn new(config: ValidatorConfig) -> Result<Self, PoolConfigurationError> {
        let probe = Arc::new(TcpProbe::new(config.verify_ssl));
        Self::with_probe(config, probe)
    }

    /// Create a validator with a custom probe
    pub fn with_probe(
        config: ValidatorConfig,
        probe: Arc<dyn Probe>,
    ) -> Result<Self, PoolConfigurationError> {
        config.check()?;
        Ok(Self { config, probe })
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Probe every node; output order matches input order
    pub async fn validate_all(&self, nodes: Vec<Node>) -> Vec<Node> {
        self.run(nodes, None).await
    }

    /// Like [`validate_all`](Self::validate_all), but stops when `shutdown`
    /// becomes `true`. In-flight probes end as cancelled and nodes that were
    /// never dequeued stay unvalidated.
    pub async fn validate_all_with_shutdown(
        &self,
        nodes: Vec<Node>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<Node> {
        self.run(nodes, Some(shutdown)).await
    }

    async fn run(&self, nodes: Vec<Node>, shutdown: Option<watch::Receiver<bool>>) -> Vec<Node> {
        let total = nodes.len();
        let width = self.config.parallelism.min(total.max(1));
        let worst_case = match worst_case_wall_time(self.config.timeout, total, width) {
            Some(bound) => format!("{:?}", bound),
            None => "unbounded".to_string(),
        };
        info!(
            "Validating {} nodes with {} workers, timeout {:?} (worst case {})",
            total, width, self.config.timeout, worst_case
        );

        let queue = Mutex::new(nodes.into_iter().enumerate());
        let workers = (0..width).map(|_| {
            let queue = &queue;
            let mut shutdown = shutdown.clone();
            async move {
                let mut done = Vec::new();
                loop {
                    if shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
                        break;
                    }
                    let next = queue.lock().await.next();
                    let Some((slot, mut node)) = next else {
                        break;
                    };
                    self.probe_node(&mut node, shutdown.as_mut()).await;
                    done.push((slot, node));
                }
                done
            }
        });
        let finished = join_all(workers).await;

        let mut slots: Vec<Option<Node>> = (0..total).map(|_| None).collect();
        for (slot, node) in finished.into_iter().flatten() {
            slots[slot] = Some(node);
        }
        // Anything left was never dequeued because of shutdown
        for (slot, node) in queue.into_inner() {
            slots[slot] = Some(node);
        }
        let nodes: Vec<Node> = slots.into_iter().flatten().collect();

        let stats = ValidationStats::from_nodes(&nodes);
        info!(
            "Validation finished: {} healthy, {} unreachable, {} invalid, {} unvalidated",
            stats.healthy, stats.unreachable, stats.invalid, stats.unvalidated
        );
        nodes
    }

    async fn probe_node(&self, node: &mut Node, shutdown: Option<&mut watch::Receiver<bool>>) {
        let start = Instant::now();
        let attempt =
            AssertUnwindSafe(tokio::time::timeout(self.config.timeout, self.probe.probe(node)))
                .catch_unwind();

        let outcome = match shutdown {
            Some(rx) => {
                tokio::select! {
                    outcome = attempt => outcome,
                    _ = wait_for_shutdown(rx) => Ok(Ok(Err(ProbeError::Cancelled))),
                }
            }
            None => attempt.await,
        };

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_elapsed)) => Err(ProbeError::Timeout),
            Err(_panic) => {
                warn!("Probe for {} panicked", node);
                Err(ProbeError::Internal("probe panicked".to_string()))
            }
        };

        match result {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!("{} healthy ({}ms)", node, elapsed);
                node.mark_healthy(elapsed, Utc::now());
            }
            Err(e) => {
                debug!("{} failed: {}", node, e);
                node.mark_failed(e.status());
            }
        }
    }
}

/// `ceil(total / width) * timeout`, or `None` when that overflows
fn worst_case_wall_time(timeout: Duration, total: usize, width: usize) -> Option<Duration> {
    let rounds = u32::try_from(total.div_ceil(width.max(1))).ok()?;
    timeout.checked_mul(rounds)
}

/// Resolve once shutdown is signalled; never resolves if the sender is gone
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
