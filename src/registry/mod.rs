//! External registry lookups
//!
//! Two operations are needed from the outside world: finding the ASN that
//! owns an address, and listing every prefix an ASN announces. Both sit
//! behind the [`Registry`] trait so the resolver can be driven by a stub in
//! tests.

pub mod client;
pub mod cymru;
pub mod ripe;

use crate::asn::AsnRecord;
use crate::exclusion::is_catch_all;
use async_trait::async_trait;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::collections::BTreeSet;
use std::net::IpAddr;

pub use client::RegistryClient;

/// Error type for registry lookups
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// DNS resolution failed
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Non-success HTTP status
    #[error("Registry returned HTTP status {0}")]
    Status(u16),

    /// Query timed out
    #[error("Registry query timed out")]
    Timeout,

    /// Response could not be parsed
    #[error("Invalid registry response: {0}")]
    InvalidFormat(String),

    /// Registry has no data for the query
    #[error("No registry data found")]
    NotFound,
}

impl LookupError {
    /// Whether retrying the same query might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            LookupError::Dns(_) | LookupError::Http(_) | LookupError::Timeout => true,
            LookupError::Status(code) => *code >= 500,
            LookupError::InvalidFormat(_) | LookupError::NotFound => false,
        }
    }
}

/// Prefixes announced by one ASN, split by family
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnouncedPrefixes {
    /// IPv4 prefixes
    pub ipv4: BTreeSet<Ipv4Net>,
    /// IPv6 prefixes
    pub ipv6: BTreeSet<Ipv6Net>,
}

impl AnnouncedPrefixes {
    /// Split CIDR strings by family
    ///
    /// Entries are trimmed and truncated to their network address. Invalid
    /// entries and catch-alls are skipped.
    pub fn from_cidrs<I, S>(cidrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut prefixes = Self::default();
        for cidr in cidrs {
            let cidr = cidr.as_ref().trim();
            match cidr.parse::<IpNet>() {
                Ok(net) if is_catch_all(&net) => {
                    tracing::debug!("Excluding catch-all prefix {cidr}");
                }
                Ok(net) => prefixes.insert(net),
                Err(_) => {
                    tracing::debug!("Skipping invalid prefix {cidr:?}");
                }
            }
        }
        prefixes
    }

    /// Add a prefix to the set for its family
    pub fn insert(&mut self, net: IpNet) {
        match net.trunc() {
            IpNet::V4(v4) => {
                self.ipv4.insert(v4);
            }
            IpNet::V6(v6) => {
                self.ipv6.insert(v6);
            }
        }
    }

    /// All prefixes, IPv4 first
    pub fn iter(&self) -> impl Iterator<Item = IpNet> + '_ {
        self.ipv4
            .iter()
            .map(|n| IpNet::V4(*n))
            .chain(self.ipv6.iter().map(|n| IpNet::V6(*n)))
    }

    /// Total number of prefixes
    pub fn len(&self) -> usize {
        self.ipv4.len() + self.ipv6.len()
    }

    /// Check if there are no prefixes
    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }
}

/// Source of ownership and announcement data
#[async_trait]
pub trait Registry: Send + Sync {
    /// Find the ASN owning `ip`
    async fn resolve_owner(&self, ip: IpAddr) -> Result<AsnRecord, LookupError>;

    /// List the prefixes announced by `asn`
    async fn announced_prefixes(&self, asn: &str) -> Result<AnnouncedPrefixes, LookupError>;
}
