//! Node data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Default country label (zh)
pub const DEFAULT_COUNTRY: &str = "未知";
/// Default country label (en)
pub const DEFAULT_COUNTRY_EN: &str = "Unknown";
/// Default node type label (zh)
pub const DEFAULT_TYPE: &str = "标准节点";
/// Default node type label (en)
pub const DEFAULT_TYPE_EN: &str = "Standard Node";
/// Default feature tag, shared by both languages
pub const DEFAULT_FEATURE: &str = "P2P";
/// Load reported when the link carries none
pub const DEFAULT_LOAD: u8 = 50;

/// Supported share-link schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    ShadowsocksR,
}

impl Protocol {
    pub const ALL: [Protocol; 5] = [
        Protocol::Vmess,
        Protocol::Vless,
        Protocol::Trojan,
        Protocol::Shadowsocks,
        Protocol::ShadowsocksR,
    ];

    /// URI scheme as it appears before `://`
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "ss",
            Protocol::ShadowsocksR => "ssr",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scheme())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|p| p.scheme().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unsupported scheme: {}", s))
    }
}

/// An unparsed share link found in source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawToken {
    pub scheme: Protocol,
    pub text: String,
    pub source_ref: String,
    /// When the source text was observed, if the producer knows
    pub observed_at: Option<DateTime<Utc>>,
}

impl RawToken {
    pub fn new(scheme: Protocol, text: impl Into<String>, source_ref: impl Into<String>) -> Self {
        Self {
            scheme,
            text: text.into(),
            source_ref: source_ref.into(),
            observed_at: None,
        }
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = Some(at);
        self
    }
}

/// Credential or UUID used by a protocol.
///
/// Only a short prefix is ever shown by `Debug`/`Display`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthIdentity(String);

impl AuthIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(4).collect();
        format!("{}***", prefix)
    }
}

impl fmt::Debug for AuthIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthIdentity({})", self.redacted())
    }
}

impl fmt::Display for AuthIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

/// Validation state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Unvalidated,
    Healthy,
    Unreachable,
    Invalid,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Unvalidated => write!(f, "unvalidated"),
            NodeStatus::Healthy => write!(f, "healthy"),
            NodeStatus::Unreachable => write!(f, "unreachable"),
            NodeStatus::Invalid => write!(f, "invalid"),
        }
    }
}

/// TLS parameters the probe should use when handshaking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsTarget {
    /// Server name for SNI, falls back to the node host
    pub server_name: Option<String>,
}

/// Descriptive, best-effort metadata carried with a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub name: String,
    pub country: String,
    pub country_en: String,
    pub node_type: String,
    pub node_type_en: String,
    pub features: Vec<String>,
    pub features_en: Vec<String>,
    pub load: u8,
}

impl NodeMetadata {
    /// Metadata with every field at its default
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            country: DEFAULT_COUNTRY.to_string(),
            country_en: DEFAULT_COUNTRY_EN.to_string(),
            node_type: DEFAULT_TYPE.to_string(),
            node_type_en: DEFAULT_TYPE_EN.to_string(),
            features: vec![DEFAULT_FEATURE.to_string()],
            features_en: vec![DEFAULT_FEATURE.to_string()],
            load: DEFAULT_LOAD,
        }
    }
}

/// Canonical record for one proxy/VPN endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub auth_identity: AuthIdentity,
    #[serde(flatten)]
    pub metadata: NodeMetadata,
    pub tls: Option<TlsTarget>,
    pub raw_config: String,
    /// Provenance tags, first-seen order, no repeats
    pub sources: Vec<String>,
    pub ping: Option<u64>,
    pub last_update: Option<DateTime<Utc>>,
    pub status: NodeStatus,
}

impl Node {
    /// Create an unvalidated node; the id is derived from the dedup key
    pub fn new(
        protocol: Protocol,
        host: String,
        port: u16,
        auth_identity: AuthIdentity,
        raw_config: String,
        source: String,
    ) -> Self {
        let id = node_id(protocol, &host, port, &auth_identity);
        let name = format!("{}:{}", host, port);
        Self {
            id,
            protocol,
            host,
            port,
            auth_identity,
            metadata: NodeMetadata::with_name(name),
            tls: None,
            raw_config,
            sources: vec![source],
            ping: None,
            last_update: None,
            status: NodeStatus::Unvalidated,
        }
    }

    /// Address in `host:port` form, bracketing IPv6 literals
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn add_source(&mut self, source: &str) {
        if !self.sources.iter().any(|s| s == source) {
            self.sources.push(source.to_string());
        }
    }

    pub fn mark_healthy(&mut self, ping_ms: u64, at: DateTime<Utc>) {
        self.status = NodeStatus::Healthy;
        self.ping = Some(ping_ms);
        self.last_update = Some(at);
    }

    pub fn mark_failed(&mut self, status: NodeStatus) {
        self.status = status;
        self.ping = None;
    }

    pub fn is_healthy(&self) -> bool {
        self.status == NodeStatus::Healthy
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{} ({})", self.protocol, self.address(), self.metadata.name)
    }
}

/// Stable id for the (protocol, host, port, authIdentity) tuple
pub fn node_id(protocol: Protocol, host: &str, port: u16, auth: &AuthIdentity) -> String {
    let key = format!(
        "{}|{}|{}|{}",
        protocol.scheme(),
        host.to_ascii_lowercase(),
        port,
        auth.expose()
    );
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}
