//! Owner lookup using Team Cymru's DNS whois service
//!
//! `<reversed address>.origin.asn.cymru.com` (or `origin6` for IPv6) returns
//! `"ASN | prefix | CC | registry | allocated"`, and `AS<asn>.asn.cymru.com`
//! returns `"ASN | CC | registry | allocated | NAME"`.

use super::LookupError;
use crate::asn::AsnRecord;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

/// Parsed origin response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginAnswer {
    /// First origin ASN listed
    pub asn: String,
    /// Covering BGP prefix
    pub prefix: String,
}

/// Create a DNS resolver for Cymru queries
pub fn create_default_resolver() -> Arc<TokioResolver> {
    Arc::new(
        TokioResolver::builder_with_config(
            ResolverConfig::cloudflare(),
            TokioConnectionProvider::default(),
        )
        .build(),
    )
}

/// Build the origin query name for an address
pub fn origin_query(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => origin_query_v4(&v4),
        IpAddr::V6(v6) => origin_query_v6(&v6),
    }
}

fn origin_query_v4(ip: &Ipv4Addr) -> String {
    let octets = ip.octets();
    format!(
        "{}.{}.{}.{}.origin.asn.cymru.com",
        octets[3], octets[2], octets[1], octets[0]
    )
}

fn origin_query_v6(ip: &Ipv6Addr) -> String {
    let nibbles: String = ip
        .octets()
        .iter()
        .rev()
        .map(|byte| format!("{:x}.{:x}.", byte & 0x0f, byte >> 4))
        .collect();
    format!("{nibbles}origin6.asn.cymru.com")
}

/// Parse an origin TXT answer
///
/// Several origin ASNs may be listed space-separated; the first is taken.
pub fn parse_origin_response(txt: &str) -> Option<OriginAnswer> {
    let parts: Vec<&str> = txt.split('|').map(str::trim).collect();
    if parts.len() < 3 {
        return None;
    }
    let asn = parts[0].split_whitespace().next()?;
    if asn.parse::<u32>().is_err() || parts[1].is_empty() {
        return None;
    }
    Some(OriginAnswer {
        asn: asn.to_string(),
        prefix: parts[1].to_string(),
    })
}

/// Parse an AS name TXT answer, returning the raw name field
pub fn parse_as_name_response(txt: &str) -> Option<String> {
    let parts: Vec<&str> = txt.split('|').map(str::trim).collect();
    if parts.len() < 5 {
        return None;
    }
    Some(parts[4].to_string())
}

/// Team Cymru owner lookups over a shared DNS resolver
#[derive(Clone)]
pub struct CymruLookup {
    resolver: Arc<TokioResolver>,
    timeout: Duration,
}

impl std::fmt::Debug for CymruLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CymruLookup")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl CymruLookup {
    /// Create a lookup using the given resolver
    pub fn new(resolver: Arc<TokioResolver>, timeout: Duration) -> Self {
        Self { resolver, timeout }
    }

    async fn txt(&self, query: String) -> Result<String, LookupError> {
        let lookup = tokio::time::timeout(self.timeout, self.resolver.txt_lookup(query))
            .await
            .map_err(|_| LookupError::Timeout)?
            .map_err(|e| LookupError::Dns(e.to_string()))?;

        let record = lookup.iter().next().ok_or(LookupError::NotFound)?;
        Ok(record
            .iter()
            .map(|data| String::from_utf8_lossy(data))
            .collect::<Vec<_>>()
            .join(""))
    }

    /// Find the owner of an address
    ///
    /// A failed AS name query still yields the ASN, with an empty
    /// description.
    pub async fn lookup(&self, ip: IpAddr) -> Result<AsnRecord, LookupError> {
        let txt = self.txt(origin_query(ip)).await?;
        let origin = parse_origin_response(&txt)
            .ok_or_else(|| LookupError::InvalidFormat(txt.clone()))?;
        tracing::debug!("{ip} originated by AS{} via {}", origin.asn, origin.prefix);

        let name = match self.txt(format!("AS{}.asn.cymru.com", origin.asn)).await {
            Ok(txt) => parse_as_name_response(&txt).unwrap_or_default(),
            Err(e) => {
                tracing::debug!("AS{} name lookup failed: {e}", origin.asn);
                String::new()
            }
        };

        Ok(AsnRecord::new(origin.asn, &name))
    }
}
