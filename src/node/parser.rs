//! Config parser for decoding raw share-link tokens into nodes
//!
//! Dispatch is by the scheme the extractor already classified, so exactly
//! one decoder runs per token. Decoders are pure: a failure is returned as
//! a [`DecodeError`] and never affects sibling tokens.

use crate::error::DecodeError;
use crate::node::models::{AuthIdentity, Node, NodeMetadata, Protocol, RawToken, TlsTarget};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};
use std::collections::HashMap;
use url::Url;

/// Upper bound for the `load` metric
const MAX_LOAD: u64 = 100;

/// Accepts padded and unpadded input and non-canonical trailing bits
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode standard or URL-safe base64, with or without padding, into UTF-8
pub fn decode_base64(input: &str) -> Option<String> {
    let normalized: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let trimmed = normalized.trim_end_matches('=');
    if trimmed.is_empty() {
        return None;
    }
    let bytes = LENIENT_BASE64.decode(trimmed).ok()?;
    String::from_utf8(bytes).ok()
}

/// Parse a port, rejecting anything outside 1..=65535
fn parse_port(value: &str) -> Result<u16, DecodeError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DecodeError::malformed("port", "missing port"));
    }
    match value.parse::<u64>() {
        Ok(port) if (1..=u16::MAX as u64).contains(&port) => Ok(port as u16),
        _ => Err(DecodeError::invalid("port", value)),
    }
}

fn parse_load(value: &str) -> Result<u8, DecodeError> {
    match value.trim().parse::<u64>() {
        Ok(load) if load <= MAX_LOAD => Ok(load as u8),
        _ => Err(DecodeError::invalid("load", value)),
    }
}

fn percent_decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Override default metadata with whatever the link carries
fn apply_metadata<F>(meta: &mut NodeMetadata, lookup: F) -> Result<(), DecodeError>
where
    F: Fn(&str) -> Option<String>,
{
    let text = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(v) = text("country") {
        meta.country = v;
    }
    if let Some(v) = text("country_en") {
        meta.country_en = v;
    }
    if let Some(v) = text("type_zh") {
        meta.node_type = v;
    }
    if let Some(v) = text("type_en") {
        meta.node_type_en = v;
    }
    if let Some(list) = text("features").map(|v| split_list(&v)).filter(|l| !l.is_empty()) {
        meta.features = list;
    }
    if let Some(list) = text("features_en").map(|v| split_list(&v)).filter(|l| !l.is_empty()) {
        meta.features_en = list;
    }
    if let Some(v) = text("load") {
        meta.load = parse_load(&v)?;
    }
    Ok(())
}

/// Split `host:port`, accepting a bracketed IPv6 host
fn split_host_port(scheme: &'static str, value: &str) -> Result<(String, u16), DecodeError> {
    let (host, port) = if let Some(rest) = value.strip_prefix('[') {
        let (host, port) = rest
            .split_once("]:")
            .ok_or_else(|| DecodeError::malformed(scheme, "unterminated IPv6 host"))?;
        (host, port)
    } else {
        value
            .rsplit_once(':')
            .ok_or_else(|| DecodeError::malformed(scheme, "missing port"))?
    };
    if host.is_empty() {
        return Err(DecodeError::malformed(scheme, "missing host"));
    }
    Ok((host.to_string(), parse_port(port)?))
}

/// Split `method:password`, requiring both halves
fn split_method_password(scheme: &'static str, value: &str) -> Result<String, DecodeError> {
    match value.split_once(':') {
        Some((method, password)) if !method.is_empty() && !password.is_empty() => {
            Ok(format!("{}:{}", method, password))
        }
        _ => Err(DecodeError::malformed(scheme, "missing method or password")),
    }
}

fn body<'a>(token: &'a RawToken) -> &'a str {
    let prefix_len = token.scheme.scheme().len() + "://".len();
    token.text.get(prefix_len..).unwrap_or_default()
}

/// Parser for the supported share-link schemes
pub struct ConfigParser;

impl ConfigParser {
    /// Decode one raw token into an unvalidated node
    pub fn parse(token: &RawToken) -> Result<Node, DecodeError> {
        let mut node = match token.scheme {
            Protocol::Vmess => Self::parse_vmess(token)?,
            Protocol::Shadowsocks => Self::parse_shadowsocks(token)?,
            Protocol::ShadowsocksR => Self::parse_shadowsocksr(token)?,
            Protocol::Vless | Protocol::Trojan => Self::parse_query_uri(token)?,
        };
        node.last_update = token.observed_at;
        Ok(node)
    }

    /// `vmess://base64(json)`
    fn parse_vmess(token: &RawToken) -> Result<Node, DecodeError> {
        const SCHEME: &str = "vmess";
        let json = decode_base64(body(token))
            .ok_or_else(|| DecodeError::malformed(SCHEME, "invalid base64 payload"))?;
        let value: Value = serde_json::from_str(&json)
            .map_err(|e| DecodeError::malformed(SCHEME, format!("invalid json: {}", e)))?;
        let obj = value
            .as_object()
            .ok_or_else(|| DecodeError::malformed(SCHEME, "payload is not an object"))?;

        let field = |key: &str| json_string(obj, key);

        let host = field("add").ok_or_else(|| DecodeError::malformed(SCHEME, "missing add"))?;
        let port = field("port").ok_or_else(|| DecodeError::malformed(SCHEME, "missing port"))?;
        let port = parse_port(&port)?;
        let id = field("id").ok_or_else(|| DecodeError::malformed(SCHEME, "missing id"))?;

        let mut node = Node::new(
            Protocol::Vmess,
            host,
            port,
            AuthIdentity::new(id),
            token.text.clone(),
            token.source_ref.clone(),
        );
        if let Some(name) = field("ps") {
            node.metadata.name = name;
        }
        if field("tls").is_some_and(|t| t.eq_ignore_ascii_case("tls")) {
            node.tls = Some(TlsTarget {
                server_name: field("sni").or_else(|| field("host")),
            });
        }
        apply_metadata(&mut node.metadata, field)?;
        Ok(node)
    }

    /// `ss://base64(method:password)@host:port#tag`, plain SIP002 user-info,
    /// or the legacy `ss://base64(method:password@host:port)#tag`
    fn parse_shadowsocks(token: &RawToken) -> Result<Node, DecodeError> {
        const SCHEME: &str = "ss";
        let (rest, tag) = match body(token).split_once('#') {
            Some((rest, tag)) => (rest, Some(percent_decode(tag))),
            None => (body(token), None),
        };
        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query)),
            None => (rest, None),
        };
        let rest = rest.trim_end_matches('/');

        let (auth, host, port) = match rest.rsplit_once('@') {
            Some((userinfo, host_port)) => {
                let auth = match decode_base64(&percent_decode(userinfo)) {
                    Some(decoded) if decoded.contains(':') => decoded,
                    _ => percent_decode(userinfo),
                };
                let (host, port) = split_host_port(SCHEME, host_port)?;
                (split_method_password(SCHEME, &auth)?, host, port)
            }
            None => {
                let decoded = decode_base64(rest)
                    .ok_or_else(|| DecodeError::malformed(SCHEME, "invalid base64 payload"))?;
                let (userinfo, host_port) = decoded
                    .rsplit_once('@')
                    .ok_or_else(|| DecodeError::malformed(SCHEME, "missing server address"))?;
                let (host, port) = split_host_port(SCHEME, host_port)?;
                (split_method_password(SCHEME, userinfo)?, host, port)
            }
        };

        let mut node = Node::new(
            Protocol::Shadowsocks,
            host,
            port,
            AuthIdentity::new(auth),
            token.text.clone(),
            token.source_ref.clone(),
        );
        if let Some(tag) = tag.filter(|t| !t.trim().is_empty()) {
            node.metadata.name = tag;
        }
        let params = query.map(parse_query).unwrap_or_default();
        apply_metadata(&mut node.metadata, |key| params.get(key).cloned())?;
        Ok(node)
    }

    /// `ssr://base64(host:port:protocol:method:obfs:base64(password)/?params)`
    fn parse_shadowsocksr(token: &RawToken) -> Result<Node, DecodeError> {
        const SCHEME: &str = "ssr";
        let decoded = decode_base64(body(token))
            .ok_or_else(|| DecodeError::malformed(SCHEME, "invalid base64 payload"))?;
        let (main, query) = match decoded.split_once("/?").or_else(|| decoded.split_once('?')) {
            Some((main, query)) => (main, Some(query)),
            None => (decoded.as_str(), None),
        };

        // Host may itself contain colons (IPv6), so split from the right
        let fields: Vec<&str> = main.trim_end_matches('/').rsplitn(6, ':').collect();
        let [password, _obfs, method, _protocol, port, host] = fields[..] else {
            return Err(DecodeError::malformed(SCHEME, "expected six fields"));
        };
        if host.is_empty() {
            return Err(DecodeError::malformed(SCHEME, "missing host"));
        }
        let port = parse_port(port)?;
        let password = decode_base64(password)
            .ok_or_else(|| DecodeError::malformed(SCHEME, "invalid password encoding"))?;
        let auth = split_method_password(SCHEME, &format!("{}:{}", method, password))?;

        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        let mut node = Node::new(
            Protocol::ShadowsocksR,
            host,
            port,
            AuthIdentity::new(auth),
            token.text.clone(),
            token.source_ref.clone(),
        );

        // Every parameter value is itself URL-safe base64
        let params: HashMap<String, String> = query
            .map(parse_query)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(k, v)| decode_base64(&v).map(|v| (k, v)))
            .collect();
        if let Some(remarks) = params.get("remarks").filter(|r| !r.trim().is_empty()) {
            node.metadata.name = remarks.clone();
        }
        apply_metadata(&mut node.metadata, |key| params.get(key).cloned())?;
        Ok(node)
    }

    /// `vless://uuid@host:port?params#tag` and `trojan://password@host:port?params#tag`
    fn parse_query_uri(token: &RawToken) -> Result<Node, DecodeError> {
        let scheme = token.scheme.scheme();
        let text = token.text.replace("&amp;", "&");
        let url = Url::parse(&text).map_err(|e| match e {
            url::ParseError::InvalidPort => DecodeError::invalid("port", "out of range"),
            other => DecodeError::malformed(scheme, other.to_string()),
        })?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DecodeError::malformed(scheme, "missing host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = match url.port() {
            Some(0) => return Err(DecodeError::invalid("port", "0")),
            Some(port) => port,
            None => return Err(DecodeError::malformed(scheme, "missing port")),
        };

        let user = percent_decode(url.username());
        let auth = match url.password() {
            Some(password) => format!("{}:{}", user, percent_decode(password)),
            None => user,
        };
        if auth.is_empty() {
            return Err(DecodeError::malformed(scheme, "missing user info"));
        }

        let params: HashMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let param = |key: &str| params.get(key).filter(|v| !v.is_empty()).cloned();

        let security = param("security").unwrap_or_default().to_ascii_lowercase();
        let uses_tls = match token.scheme {
            Protocol::Trojan => security != "none",
            _ => matches!(security.as_str(), "tls" | "reality" | "xtls"),
        };

        let mut node = Node::new(
            token.scheme,
            host,
            port,
            AuthIdentity::new(auth),
            token.text.clone(),
            token.source_ref.clone(),
        );
        if uses_tls {
            node.tls = Some(TlsTarget {
                server_name: param("sni")
                    .or_else(|| param("peer"))
                    .or_else(|| param("host")),
            });
        }
        if let Some(tag) = url.fragment().map(percent_decode).filter(|t| !t.trim().is_empty()) {
            node.metadata.name = tag;
        }
        apply_metadata(&mut node.metadata, |key| params.get(key).cloned())?;
        Ok(node)
    }
}

/// Read a JSON field as a non-empty string, accepting numbers too
fn json_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Split `a=1&b=2` into percent-decoded pairs
fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .replace("&amp;", "&")
        .split('&')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (!k.is_empty()).then(|| (percent_decode(k), percent_decode(&v.replace('+', " "))))
        })
        .collect()
}
