//! Health policy and the wire payload handed to the publishing backend

use crate::node::models::Node;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Default ping ceiling in milliseconds
const DEFAULT_MAX_PING_MS: u64 = 500;

/// Default load ceiling
const DEFAULT_MAX_LOAD: u8 = 90;

/// Thresholds deciding publish vs delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPolicy {
    pub max_ping_ms: u64,
    pub max_load: u8,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            max_ping_ms: DEFAULT_MAX_PING_MS,
            max_load: DEFAULT_MAX_LOAD,
        }
    }
}

impl HealthPolicy {
    pub fn new(max_ping_ms: u64, max_load: u8) -> Self {
        Self {
            max_ping_ms,
            max_load,
        }
    }

    pub fn accepts(&self, node: &Node) -> bool {
        node.is_healthy()
            && node.ping.is_some_and(|ping| ping < self.max_ping_ms)
            && node.metadata.load < self.max_load
    }

    /// Split nodes into those to publish and the ids to delete
    pub fn partition<'a>(&self, nodes: &'a [Node]) -> (Vec<&'a Node>, Vec<String>) {
        let mut publish = Vec::new();
        let mut delete = Vec::new();
        for node in nodes {
            if self.accepts(node) {
                publish.push(node);
            } else {
                delete.push(node.id.clone());
            }
        }
        (publish, delete)
    }
}

/// Per-language descriptive fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub country: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translations {
    pub zh: Translation,
    pub en: Translation,
}

/// Node as the backend expects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePayload {
    pub id: String,
    pub translations: Translations,
    pub speed: String,
    pub load: u8,
    pub last_update: String,
    pub source: String,
    pub config: String,
}

impl From<&Node> for NodePayload {
    fn from(node: &Node) -> Self {
        let meta = &node.metadata;
        let last_update = node.last_update.unwrap_or_else(Utc::now);
        Self {
            id: node.id.clone(),
            translations: Translations {
                zh: Translation {
                    country: meta.country.clone(),
                    node_type: meta.node_type.clone(),
                    features: meta.features.clone(),
                },
                en: Translation {
                    country: meta.country_en.clone(),
                    node_type: meta.node_type_en.clone(),
                    features: meta.features_en.clone(),
                },
            },
            speed: node
                .ping
                .map_or_else(|| "Unknown".to_string(), |ping| format!("{}ms", ping)),
            load: meta.load,
            last_update: last_update.to_rfc3339_opts(SecondsFormat::Secs, true),
            source: node.sources.join(", "),
            config: node.raw_config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::models::{AuthIdentity, NodeStatus, Protocol};
    use chrono::TimeZone;

    fn node(port: u16) -> Node {
        Node::new(
            Protocol::Vmess,
            "1.2.3.4".to_string(),
            port,
            AuthIdentity::new("uuid"),
            format!("vmess://raw-{}", port),
            "telegram".to_string(),
        )
    }

    #[test]
    fn test_policy_partition() {
        let at = Utc::now();
        let mut fast = node(1);
        fast.mark_healthy(120, at);
        let mut slow = node(2);
        slow.mark_healthy(900, at);
        let mut loaded = node(3);
        loaded.mark_healthy(100, at);
        loaded.metadata.load = 95;
        let mut dead = node(4);
        dead.mark_failed(NodeStatus::Unreachable);
        let unvalidated = node(5);

        let nodes = vec![fast.clone(), slow.clone(), loaded.clone(), dead.clone(), unvalidated.clone()];
        let (publish, delete) = HealthPolicy::default().partition(&nodes);
        assert_eq!(publish.len(), 1);
        assert_eq!(publish[0].id, fast.id);
        assert_eq!(delete, vec![slow.id, loaded.id, dead.id, unvalidated.id]);
    }

    #[test]
    fn test_policy_custom_thresholds() {
        let mut slow = node(1);
        slow.mark_healthy(900, Utc::now());
        assert!(!HealthPolicy::default().accepts(&slow));
        assert!(HealthPolicy::new(1000, 90).accepts(&slow));
    }

    #[test]
    fn test_payload_mapping() {
        let mut n = node(443);
        n.add_source("github");
        n.metadata.country_en = "Japan".to_string();
        n.mark_healthy(87, Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap());

        let payload = NodePayload::from(&n);
        assert_eq!(payload.id, n.id);
        assert_eq!(payload.speed, "87ms");
        assert_eq!(payload.load, 50);
        assert_eq!(payload.last_update, "2026-03-04T05:06:07Z");
        assert_eq!(payload.source, "telegram, github");
        assert_eq!(payload.config, "vmess://raw-443");
        assert_eq!(payload.translations.zh.country, "未知");
        assert_eq!(payload.translations.en.country, "Japan");
        assert_eq!(payload.translations.en.node_type, "Standard Node");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["lastUpdate"], "2026-03-04T05:06:07Z");
        assert_eq!(json["translations"]["zh"]["type"], "标准节点");
        assert_eq!(json["translations"]["en"]["features"][0], "P2P");
    }

    #[test]
    fn test_payload_unknown_speed() {
        let payload = NodePayload::from(&node(80));
        assert_eq!(payload.speed, "Unknown");
    }
}
