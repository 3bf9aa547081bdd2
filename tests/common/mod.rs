//! Shared helpers for integration tests

#![allow(dead_code)]

use asnlog::{AnnouncedPrefixes, AsnRecord, LookupError, Registry};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One network the stub knows about
pub struct StubNetwork {
    pub asn: &'static str,
    pub description: &'static str,
    pub prefixes: Vec<&'static str>,
}

/// In-memory registry with call counters and scripted failures
#[derive(Default)]
pub struct StubRegistry {
    networks: Vec<StubNetwork>,
    owner_failures: Mutex<usize>,
    prefix_failures: Mutex<usize>,
    pub owner_calls: AtomicUsize,
    pub prefix_calls: AtomicUsize,
}

impl StubRegistry {
    pub fn new(networks: Vec<StubNetwork>) -> Self {
        Self {
            networks,
            ..Self::default()
        }
    }

    /// The usual test registry: Google and Cloudflare
    pub fn well_known() -> Self {
        Self::new(vec![
            StubNetwork {
                asn: "15169",
                description: "GOOGLE, LLC",
                prefixes: vec!["8.8.8.0/24", "8.8.4.0/24", "2001:4860::/32"],
            },
            StubNetwork {
                asn: "13335",
                description: "CLOUDFLARENET",
                prefixes: vec!["1.1.1.0/24", "1.0.0.0/24"],
            },
        ])
    }

    /// Fail the next `n` owner lookups with a timeout
    pub fn fail_owner(&self, n: usize) {
        *self.owner_failures.lock().unwrap() = n;
    }

    /// Fail the next `n` prefix lookups with a server error
    pub fn fail_prefixes(&self, n: usize) {
        *self.prefix_failures.lock().unwrap() = n;
    }

    pub fn owner_calls(&self) -> usize {
        self.owner_calls.load(Ordering::SeqCst)
    }

    pub fn prefix_calls(&self) -> usize {
        self.prefix_calls.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &Mutex<usize>) -> bool {
        let mut remaining = counter.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }

    fn owning(&self, ip: IpAddr) -> Option<&StubNetwork> {
        self.networks.iter().find(|network| {
            network
                .prefixes
                .iter()
                .filter_map(|p| p.parse::<ipnet::IpNet>().ok())
                .any(|net| net.contains(&ip))
        })
    }
}

#[async_trait]
impl Registry for StubRegistry {
    async fn resolve_owner(&self, ip: IpAddr) -> Result<AsnRecord, LookupError> {
        self.owner_calls.fetch_add(1, Ordering::SeqCst);
        // Give other tasks a chance to interleave
        tokio::task::yield_now().await;

        if Self::take_failure(&self.owner_failures) {
            return Err(LookupError::Timeout);
        }
        let network = self.owning(ip).ok_or(LookupError::NotFound)?;
        Ok(AsnRecord {
            asn: network.asn.to_string(),
            description: network.description.to_string(),
        })
    }

    async fn announced_prefixes(&self, asn: &str) -> Result<AnnouncedPrefixes, LookupError> {
        self.prefix_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if Self::take_failure(&self.prefix_failures) {
            return Err(LookupError::Status(503));
        }
        let network = self
            .networks
            .iter()
            .find(|network| network.asn == asn)
            .ok_or(LookupError::NotFound)?;
        Ok(AnnouncedPrefixes::from_cidrs(&network.prefixes))
    }
}
