//! On-disk cache format
//!
//! ```json
//! {
//!   "last_updated": "2025-01-31",
//!   "data": {
//!     "15169": {"description": "google", "ipv4": ["8.8.8.0/24"], "ipv6": []}
//!   }
//! }
//! ```
//!
//! Entries in `data` keep the order the ASNs were first recorded in. That
//! order decides which ASN wins an address covered by overlapping subnets,
//! so it is preserved in both directions.

use crate::exclusion::is_catch_all;
use chrono::NaiveDate;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Whole cache file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFile {
    /// Date the file was written
    pub last_updated: NaiveDate,
    /// Entries keyed by ASN, in first-recorded order
    #[serde(with = "ordered_entries")]
    pub data: Vec<(String, CacheEntry)>,
}

/// Cached subnets of one ASN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Normalized AS description
    pub description: String,
    /// IPv4 subnets
    pub ipv4: Vec<Ipv4Net>,
    /// IPv6 subnets
    pub ipv6: Vec<Ipv6Net>,
}

impl CacheFile {
    /// Parse a cache file
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Encode as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Age of the file in whole days relative to `today`
    ///
    /// Negative when `last_updated` lies in the future.
    pub fn age_days(&self, today: NaiveDate) -> i64 {
        today.signed_duration_since(self.last_updated).num_days()
    }

    /// Entry for `asn`, if present
    pub fn entry(&self, asn: &str) -> Option<&CacheEntry> {
        self.data
            .iter()
            .find(|(key, _)| key == asn)
            .map(|(_, entry)| entry)
    }
}

/// `data` as a JSON object whose key order is kept
mod ordered_entries {
    use super::CacheEntry;
    use serde::de::{Error, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::collections::HashSet;
    use std::fmt;

    pub fn serialize<S>(entries: &[(String, CacheEntry)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (asn, entry) in entries {
            map.serialize_entry(asn, entry)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, CacheEntry)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(EntriesVisitor)
    }

    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
        type Value = Vec<(String, CacheEntry)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of ASN entries")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut seen = HashSet::new();
            let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((asn, entry)) = access.next_entry::<String, CacheEntry>()? {
                if !seen.insert(asn.clone()) {
                    return Err(A::Error::custom(format!("duplicate ASN {asn}")));
                }
                entries.push((asn, entry));
            }
            Ok(entries)
        }
    }
}

/// Collapse IPv4 subnets into the minimal covering set
///
/// Catch-alls are dropped from both input and output.
pub fn summarize_v4(subnets: &BTreeSet<Ipv4Net>) -> Vec<Ipv4Net> {
    let candidates: Vec<Ipv4Net> = subnets
        .iter()
        .filter(|net| !is_catch_all(&IpNet::V4(**net)))
        .copied()
        .collect();
    Ipv4Net::aggregate(&candidates)
        .into_iter()
        .filter(|net| !is_catch_all(&IpNet::V4(*net)))
        .collect()
}

/// Collapse IPv6 subnets into the minimal covering set
///
/// Catch-alls are dropped from both input and output.
pub fn summarize_v6(subnets: &BTreeSet<Ipv6Net>) -> Vec<Ipv6Net> {
    let candidates: Vec<Ipv6Net> = subnets
        .iter()
        .filter(|net| !is_catch_all(&IpNet::V6(**net)))
        .copied()
        .collect();
    Ipv6Net::aggregate(&candidates)
        .into_iter()
        .filter(|net| !is_catch_all(&IpNet::V6(*net)))
        .collect()
}
