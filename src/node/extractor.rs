//! Link extractor for pulling share links out of free text
//!
//! Text may be HTML, markdown or chat noise. Each scheme has its own
//! pattern anchored at the scheme prefix, and a match stops at the first
//! character outside that scheme's alphabet.

use crate::node::models::{Protocol, RawToken};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Base64 alphabet, standard and URL-safe
const BASE64_CHARS: &str = r"[A-Za-z0-9+/=_\-]";

/// Bracketed IPv6 literal or a hostname / IPv4 address
const HOST: &str = r"(?:\[[0-9A-Fa-f:.]+\]|[A-Za-z0-9.\-]+)";

/// Optional path slash followed by an optional query string
const QUERY: &str = r"/?(?:\?[A-Za-z0-9\-._~%!$&*+,;=:@/?]*)?";

/// Optional `#tag`, ending at whitespace or markup punctuation
const FRAGMENT: &str = r#"(?:#[^\s<>"'`()\[\]{}|\\^]*)?"#;

/// Names of the capture groups, one per scheme
const GROUPS: [(&str, Protocol); 5] = [
    ("vmess", Protocol::Vmess),
    ("ssr", Protocol::ShadowsocksR),
    ("ss", Protocol::Shadowsocks),
    ("vless", Protocol::Vless),
    ("trojan", Protocol::Trojan),
];

static LINK_REGEX: Lazy<Regex> = Lazy::new(|| {
    let vmess = format!(r"vmess://{b}+", b = BASE64_CHARS);
    let ssr = format!(r"ssr://{b}+", b = BASE64_CHARS);
    // SIP002 `userinfo@host:port`, else a bare legacy base64 body
    let ss = format!(
        r"ss://(?:[A-Za-z0-9+/=_\-%:.]+@{h}:\d+|{b}+){q}{f}",
        h = HOST,
        b = BASE64_CHARS,
        q = QUERY,
        f = FRAGMENT
    );
    let uri = |scheme: &str| {
        format!(
            r"{s}://[A-Za-z0-9\-._~%!$*+,;=:]+@{h}:\d+{q}{f}",
            s = scheme,
            h = HOST,
            q = QUERY,
            f = FRAGMENT
        )
    };
    let pattern = format!(
        r"(?:(?P<vmess>{})|(?P<ssr>{})|(?P<ss>{})|(?P<vless>{})|(?P<trojan>{}))",
        vmess,
        ssr,
        ss,
        uri("vless"),
        uri("trojan"),
    );
    Regex::new(&pattern).expect("Invalid share link regex")
});

/// A link must not continue an ASCII word (`xss://`, `class://`).
/// Non-ASCII text such as CJK may run straight into a link.
fn starts_at_boundary(text: &str, start: usize) -> bool {
    !text[..start]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Classify a match by the named group that captured it
fn classify(caps: &Captures<'_>) -> Option<(Protocol, String)> {
    GROUPS.iter().find_map(|(group, protocol)| {
        caps.name(group)
            .map(|m| (*protocol, m.as_str().to_string()))
    })
}

/// Extracts typed raw tokens from arbitrary text
pub struct LinkExtractor;

impl LinkExtractor {
    /// Scan `text` for share links, in order of first occurrence.
    ///
    /// The returned iterator is lazy; call again to restart. Matches never
    /// overlap and unrecognised text is skipped.
    pub fn extract<'t>(text: &'t str, source_ref: &'t str) -> impl Iterator<Item = RawToken> + 't {
        LINK_REGEX.captures_iter(text).filter_map(move |caps| {
            if !starts_at_boundary(text, caps.get(0)?.start()) {
                return None;
            }
            let (scheme, link) = classify(&caps)?;
            Some(RawToken::new(scheme, link, source_ref))
        })
    }

    /// Convenience wrapper collecting every token
    pub fn extract_all(text: &str, source_ref: &str) -> Vec<RawToken> {
        Self::extract(text, source_ref).collect()
    }
}
