//! Production registry client
//!
//! Combines the Cymru owner lookup with the RIPEstat prefix lookup. One DNS
//! resolver and one pooled HTTP client are created up front and shared by
//! every query for the rest of the run.

use super::cymru::{create_default_resolver, CymruLookup};
use super::ripe::RipeStat;
use super::{AnnouncedPrefixes, LookupError, Registry};
use crate::asn::AsnRecord;
use crate::config::RegistryConfig;
use async_trait::async_trait;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

/// Registry client backed by Team Cymru DNS and RIPEstat
#[derive(Debug, Clone)]
pub struct RegistryClient {
    owner: CymruLookup,
    prefixes: RipeStat,
    retries: u32,
    retry_backoff: Duration,
}

impl RegistryClient {
    /// Create a client from configuration
    pub fn new(config: &RegistryConfig) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("asnlog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LookupError::Http(e.to_string()))?;

        Ok(Self {
            owner: CymruLookup::new(create_default_resolver(), config.timeout),
            prefixes: RipeStat::new(http, config.ripe_url.clone()),
            retries: config.retries,
            retry_backoff: config.retry_backoff,
        })
    }
}

/// Run `op`, retrying transient failures up to `retries` extra times
pub async fn with_retries<T, F, Fut>(
    retries: u32,
    backoff: Duration,
    what: &str,
    mut op: F,
) -> Result<T, LookupError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LookupError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                tracing::debug!("{what} failed ({e}), retry {attempt}/{retries}");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn resolve_owner(&self, ip: IpAddr) -> Result<AsnRecord, LookupError> {
        let what = format!("owner lookup for {ip}");
        with_retries(self.retries, self.retry_backoff, &what, || self.owner.lookup(ip)).await
    }

    async fn announced_prefixes(&self, asn: &str) -> Result<AnnouncedPrefixes, LookupError> {
        let what = format!("prefix lookup for AS{asn}");
        with_retries(self.retries, self.retry_backoff, &what, || {
            self.prefixes.announced_prefixes(asn)
        })
        .await
    }
}
