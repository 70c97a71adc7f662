//! Optional GeoIP enrichment of node country metadata using MMDB

use crate::node::models::{Node, DEFAULT_COUNTRY_EN};
use crate::Result;
use maxminddb::{geoip2, Reader};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Country-level location of an IP address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GeoLocation {
    /// ISO 3166-1 alpha-2 country code (e.g., "US", "HK")
    pub country_code: Option<String>,
    /// Country name in English
    pub country_name: Option<String>,
}

impl GeoLocation {
    pub fn new(country_code: Option<String>, country_name: Option<String>) -> Self {
        Self {
            country_code,
            country_name,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.country_code.is_none() && self.country_name.is_none()
    }

    /// English label for node metadata, preferring the full name
    pub fn label(&self) -> Option<&str> {
        self.country_name
            .as_deref()
            .or(self.country_code.as_deref())
    }
}

/// Looks up IP addresses in an MMDB database
#[derive(Clone)]
pub struct GeoLocator {
    reader: Arc<Reader<Vec<u8>>>,
}

impl GeoLocator {
    /// Open an MMDB file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    /// Look up an IP address
    pub fn lookup_ip(&self, ip: IpAddr) -> Result<GeoLocation> {
        let lookup_result = self.reader.lookup(ip)?;
        let country: Option<geoip2::Country> = lookup_result.decode()?;

        let Some(country) = country else {
            return Ok(GeoLocation::default());
        };

        Ok(GeoLocation::new(
            country.country.iso_code.map(String::from),
            country.country.names.english.map(String::from),
        ))
    }

    /// Fill `country_en` when the link left it at the default.
    ///
    /// Only IP-literal hosts are looked up; returns whether the node changed.
    pub fn enrich(&self, node: &mut Node) -> bool {
        if node.metadata.country_en != DEFAULT_COUNTRY_EN {
            return false;
        }
        let Ok(ip) = node.host.parse::<IpAddr>() else {
            return false;
        };
        match self.lookup_ip(ip) {
            Ok(location) => apply_location(node, &location),
            Err(e) => {
                debug!("GeoIP lookup failed for {}: {}", node.host, e);
                false
            }
        }
    }
}

fn apply_location(node: &mut Node, location: &GeoLocation) -> bool {
    match location.label() {
        Some(label) => {
            node.metadata.country_en = label.to_string();
            true
        }
        None => false,
    }
}
