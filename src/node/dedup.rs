//! Collapse nodes sharing the same (protocol, host, port, authIdentity) key

use crate::node::models::{
    Node, NodeMetadata, DEFAULT_COUNTRY, DEFAULT_COUNTRY_EN, DEFAULT_FEATURE, DEFAULT_LOAD,
    DEFAULT_TYPE, DEFAULT_TYPE_EN,
};
use std::collections::HashMap;

/// Deduplicate by node id.
///
/// Output keeps the order in which each id first appears. Within a group the
/// instance with the most recent `last_update` wins conflicting fields, with
/// ties going to the lexicographically smallest `raw_config`, so the merged
/// node does not depend on input order. Defaulted fields are filled from the
/// other instances in the same precedence, feature lists are unioned and
/// sorted, and provenance tags are kept in first-seen order.
pub fn dedupe(nodes: Vec<Node>) -> Vec<Node> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(nodes.len());
    let mut groups: Vec<Vec<Node>> = Vec::with_capacity(nodes.len());

    for node in nodes {
        match index.get(&node.id) {
            Some(&slot) => groups[slot].push(node),
            None => {
                index.insert(node.id.clone(), groups.len());
                groups.push(vec![node]);
            }
        }
    }

    groups.into_iter().filter_map(merge_group).collect()
}

/// Merge every instance of one id
fn merge_group(mut group: Vec<Node>) -> Option<Node> {
    let merged = group.len() > 1;
    let mut sources: Vec<String> = Vec::new();
    for source in group.iter().flat_map(|n| n.sources.iter()) {
        if !sources.contains(source) {
            sources.push(source.clone());
        }
    }

    group.sort_by(|a, b| {
        b.last_update
            .cmp(&a.last_update)
            .then_with(|| a.raw_config.cmp(&b.raw_config))
    });
    let mut instances = group.into_iter();
    let mut winner = instances.next()?;

    for loser in instances {
        winner.metadata = merge_metadata(winner.metadata, &loser.metadata);
        if winner.tls.is_none() {
            winner.tls = loser.tls;
        }
    }
    if merged {
        winner.metadata.features.sort();
        winner.metadata.features_en.sort();
    }
    winner.sources = sources;
    Some(winner)
}

fn merge_metadata(mut winner: NodeMetadata, loser: &NodeMetadata) -> NodeMetadata {
    fn fill(value: &mut String, default: &str, other: &str) {
        if value == default && other != default {
            *value = other.to_string();
        }
    }

    fill(&mut winner.country, DEFAULT_COUNTRY, &loser.country);
    fill(&mut winner.country_en, DEFAULT_COUNTRY_EN, &loser.country_en);
    fill(&mut winner.node_type, DEFAULT_TYPE, &loser.node_type);
    fill(&mut winner.node_type_en, DEFAULT_TYPE_EN, &loser.node_type_en);
    union_features(&mut winner.features, &loser.features);
    union_features(&mut winner.features_en, &loser.features_en);
    if winner.load == DEFAULT_LOAD {
        winner.load = loser.load;
    }
    winner
}

fn union_features(winner: &mut Vec<String>, loser: &[String]) {
    let is_default = |list: &[String]| list.len() == 1 && list[0] == DEFAULT_FEATURE;
    if is_default(loser) {
        return;
    }
    if is_default(winner) {
        winner.clear();
    }
    for feature in loser {
        if !winner.contains(feature) {
            winner.push(feature.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::models::{AuthIdentity, NodeStatus, Protocol};
    use chrono::{TimeZone, Utc};

    fn node(host: &str, source: &str) -> Node {
        Node::new(
            Protocol::Shadowsocks,
            host.to_string(),
            8388,
            AuthIdentity::new("aes-256-gcm:pass"),
            format!("ss://YWVzLTI1Ni1nY206cGFzcw@{}:8388", host),
            source.to_string(),
        )
    }

    #[test]
    fn test_dedupe_collapses_same_key() {
        let nodes = vec![
            node("1.2.3.4", "telegram"),
            node("5.6.7.8", "telegram"),
            node("1.2.3.4", "github"),
        ];
        let result = dedupe(nodes);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].host, "1.2.3.4");
        assert_eq!(result[1].host, "5.6.7.8");
        assert_eq!(
            result[0].sources,
            vec!["telegram".to_string(), "github".to_string()]
        );
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let mut a = node("1.2.3.4", "a");
        a.metadata.features = vec!["Netflix".to_string()];
        let mut b = node("1.2.3.4", "b");
        b.metadata.country_en = "Japan".to_string();
        let nodes = vec![a, node("9.9.9.9", "a"), b, node("9.9.9.9", "c")];

        let once = dedupe(nodes);
        let twice = dedupe(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_dedupe_prefers_most_recent() {
        let older_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let newer_at = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();

        let mut older = node("1.2.3.4", "old");
        older.last_update = Some(older_at);
        older.metadata.name = "old name".to_string();
        older.metadata.country = "日本".to_string();
        older.metadata.load = 70;

        let mut newer = node("1.2.3.4", "new");
        newer.last_update = Some(newer_at);
        newer.metadata.name = "new name".to_string();
        newer.metadata.country_en = "Japan".to_string();

        let result = dedupe(vec![older.clone(), newer.clone()]);
        assert_eq!(result.len(), 1);
        let merged = &result[0];
        assert_eq!(merged.metadata.name, "new name");
        assert_eq!(merged.last_update, Some(newer_at));
        // Union: defaulted fields filled from the older instance
        assert_eq!(merged.metadata.country, "日本");
        assert_eq!(merged.metadata.country_en, "Japan");
        assert_eq!(merged.metadata.load, 70);
        assert_eq!(merged.sources, vec!["old".to_string(), "new".to_string()]);

        // Same winner when the input order is reversed
        let reversed = dedupe(vec![newer, older]);
        assert_eq!(reversed[0].metadata.name, "new name");
        assert_eq!(reversed[0].metadata.country, "日本");
        assert_eq!(reversed[0].sources, vec!["new".to_string(), "old".to_string()]);
    }

    #[test]
    fn test_dedupe_unions_features() {
        let mut a = node("1.2.3.4", "a");
        a.metadata.features = vec!["Netflix".to_string()];
        let mut b = node("1.2.3.4", "b");
        b.metadata.features = vec!["ChatGPT".to_string(), "Netflix".to_string()];

        let result = dedupe(vec![a, b]);
        assert_eq!(result[0].metadata.features, vec!["ChatGPT", "Netflix"]);
        assert_eq!(result[0].metadata.features_en, vec!["P2P"]);
    }

    #[test]
    fn test_dedupe_keeps_validation_fields_of_winner() {
        let mut healthy = node("1.2.3.4", "a");
        healthy.mark_healthy(80, Utc::now());
        let fresh = node("1.2.3.4", "b");

        let result = dedupe(vec![fresh, healthy]);
        assert_eq!(result[0].status, NodeStatus::Healthy);
        assert_eq!(result[0].ping, Some(80));
    }

    #[test]
    fn test_dedupe_empty() {
        assert!(dedupe(Vec::new()).is_empty());
    }

    #[test]
    fn test_dedupe_ignores_input_order_on_ties() {
        let mut alpha = node("1.2.3.4", "a");
        alpha.raw_config = "ss://YWVzLTI1Ni1nY206cGFzcw@1.2.3.4:8388#Alpha".to_string();
        alpha.metadata.name = "Alpha".to_string();
        alpha.metadata.features = vec!["Netflix".to_string()];
        let mut beta = node("1.2.3.4", "b");
        beta.raw_config = "ss://YWVzLTI1Ni1nY206cGFzcw@1.2.3.4:8388#Beta".to_string();
        beta.metadata.name = "Beta".to_string();
        beta.metadata.country_en = "Japan".to_string();
        beta.metadata.features = vec!["ChatGPT".to_string()];
        let mut gamma = node("1.2.3.4", "c");
        gamma.raw_config = "ss://YWVzLTI1Ni1nY206cGFzcw@1.2.3.4:8388#Gamma".to_string();
        gamma.metadata.name = "Gamma".to_string();
        gamma.metadata.country_en = "Korea".to_string();

        let orders = [
            vec![alpha.clone(), beta.clone(), gamma.clone()],
            vec![beta.clone(), alpha.clone(), gamma.clone()],
            vec![gamma.clone(), beta.clone(), alpha.clone()],
            vec![beta.clone(), gamma.clone(), alpha.clone()],
        ];
        for order in orders {
            let result = dedupe(order);
            assert_eq!(result.len(), 1);
            let merged = &result[0];
            assert_eq!(merged.metadata.name, "Alpha");
            assert!(merged.raw_config.ends_with("#Alpha"));
            assert_eq!(merged.metadata.country_en, "Japan");
            assert_eq!(merged.metadata.features, vec!["ChatGPT", "Netflix"]);
            let mut sources = merged.sources.clone();
            sources.sort();
            assert_eq!(sources, vec!["a", "b", "c"]);
        }
    }
}
