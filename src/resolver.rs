//! Concurrent IP-to-ASN resolution
//!
//! Each address goes through the same steps: excluded addresses stop
//! immediately, cached addresses are answered from the [`Store`], and misses
//! are sent to the [`Registry`]. A successful owner lookup for an ASN the
//! store has not seen yet also pulls in every prefix that ASN announces, so
//! later addresses from the same network are answered locally.
//!
//! The store's lock is only taken for the in-memory read or write, never
//! while a registry query is in flight. Concurrent misses for the same new
//! ASN share a single prefix fetch.

use crate::asn::{AsnRecord, ResolutionResult};
use crate::config::DEFAULT_CONCURRENCY;
use crate::exclusion::is_excluded;
use crate::registry::Registry;
use crate::store::Store;
use futures::stream::{self, Stream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// Prefix fetches in progress, keyed by ASN
type InFlight = Mutex<HashMap<String, Arc<OnceCell<()>>>>;

/// Resolves addresses against a shared store and registry
///
/// Cloning is cheap; clones share the same store and registry.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<Store>,
    registry: Arc<dyn Registry>,
    concurrency: usize,
    in_flight: Arc<InFlight>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("store", &self.store)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Create a resolver with the default concurrency
    pub fn new(store: Arc<Store>, registry: Arc<dyn Registry>) -> Self {
        Self::with_concurrency(store, registry, DEFAULT_CONCURRENCY)
    }

    /// Create a resolver running at most `concurrency` resolutions at once
    pub fn with_concurrency(
        store: Arc<Store>,
        registry: Arc<dyn Registry>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            registry,
            concurrency: concurrency.max(1),
            in_flight: Arc::default(),
        }
    }

    /// The store backing this resolver
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Resolve an address given as a string
    ///
    /// Strings that do not parse as an IP address resolve to `None`.
    pub async fn resolve(&self, ip: &str) -> ResolutionResult {
        match ip.trim().parse::<IpAddr>() {
            Ok(addr) => self.resolve_ip(addr).await,
            Err(_) => {
                tracing::debug!("Skipping malformed address {ip:?}");
                None
            }
        }
    }

    /// Resolve an address
    pub async fn resolve_ip(&self, ip: IpAddr) -> ResolutionResult {
        if is_excluded(ip) {
            tracing::trace!("{ip} is in an excluded range");
            return None;
        }

        if let Some(record) = self.store.lookup(ip) {
            tracing::trace!("{ip} found in cache: {record}");
            return Some(record);
        }

        tracing::debug!("{ip} not cached, querying registry");
        let record = match self.registry.resolve_owner(ip).await {
            Ok(record) => record.normalized(),
            Err(e) => {
                tracing::debug!("Owner lookup for {ip} failed: {e}");
                return None;
            }
        };

        if !self.store.knows_asn(&record.asn) {
            self.fetch_prefixes_once(&record).await;
        }
        Some(record)
    }

    /// Fetch the prefixes of `record`'s ASN unless another task already is
    ///
    /// Callers arriving while a fetch runs wait for it instead of starting
    /// their own. Once it completes the slot is released, so a later miss
    /// after a failed fetch tries again.
    async fn fetch_prefixes_once(&self, record: &AsnRecord) {
        let slot = {
            let mut in_flight = self.in_flight.lock().expect("mutex poisoned");
            Arc::clone(in_flight.entry(record.asn.clone()).or_default())
        };

        slot.get_or_init(|| async {
            if !self.store.knows_asn(&record.asn) {
                self.fetch_prefixes(record).await;
            }
        })
        .await;

        let mut in_flight = self.in_flight.lock().expect("mutex poisoned");
        if in_flight
            .get(&record.asn)
            .is_some_and(|current| Arc::ptr_eq(current, &slot))
        {
            in_flight.remove(&record.asn);
        }
    }

    async fn fetch_prefixes(&self, record: &AsnRecord) {
        match self.registry.announced_prefixes(&record.asn).await {
            Ok(prefixes) => {
                self.store.add_subnets(record, &prefixes);
            }
            Err(e) => {
                tracing::debug!("Prefix lookup for AS{} failed: {e}", record.asn);
            }
        }
    }

    /// Resolve addresses concurrently, yielding each as it completes
    ///
    /// At most `concurrency` resolutions run at once. Results come back in
    /// completion order, paired with the input they belong to.
    pub fn resolve_stream<'a, I>(
        &'a self,
        ips: I,
    ) -> impl Stream<Item = (I::Item, ResolutionResult)> + 'a
    where
        I: IntoIterator,
        I::IntoIter: 'a,
        I::Item: AsRef<str> + 'a,
    {
        stream::iter(ips)
            .map(move |ip| async move {
                let result = self.resolve(ip.as_ref()).await;
                (ip, result)
            })
            .buffer_unordered(self.concurrency)
    }

    /// Resolve many addresses concurrently
    ///
    /// Duplicates are resolved once. The result has one entry per distinct
    /// input string.
    pub async fn resolve_many<I, S>(&self, ips: I) -> HashMap<String, ResolutionResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let unique: Vec<String> = ips
            .into_iter()
            .map(Into::into)
            .filter(|ip| seen.insert(ip.clone()))
            .collect();

        self.resolve_stream(unique).collect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AnnouncedPrefixes, LookupError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRegistry {
        owner_calls: AtomicUsize,
        prefix_calls: AtomicUsize,
    }

    #[async_trait]
    impl Registry for CountingRegistry {
        async fn resolve_owner(&self, _ip: IpAddr) -> Result<AsnRecord, LookupError> {
            self.owner_calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(AsnRecord {
                asn: "64500".to_string(),
                description: "Example Networks, Inc.".to_string(),
            })
        }

        async fn announced_prefixes(&self, _asn: &str) -> Result<AnnouncedPrefixes, LookupError> {
            self.prefix_calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(AnnouncedPrefixes::from_cidrs(["192.0.2.0/24"]))
        }
    }

    fn resolver() -> (Resolver, Arc<CountingRegistry>) {
        let registry = Arc::new(CountingRegistry::default());
        let resolver = Resolver::new(Arc::new(Store::in_memory()), registry.clone());
        (resolver, registry)
    }

    #[tokio::test]
    async fn test_malformed_input_is_none() {
        let (resolver, registry) = resolver();
        assert_eq!(resolver.resolve("not-an-ip").await, None);
        assert_eq!(resolver.resolve("").await, None);
        assert_eq!(resolver.resolve("300.1.1.1").await, None);
        assert_eq!(registry.owner_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_excluded_never_queries_registry() {
        let (resolver, registry) = resolver();
        for ip in ["10.1.2.3", "127.0.0.1", "192.168.0.10", "::1", "fe80::1"] {
            assert_eq!(resolver.resolve(ip).await, None, "{ip}");
        }
        assert_eq!(registry.owner_calls.load(Ordering::SeqCst), 0);
        assert!(resolver.store().is_empty());
    }

    #[tokio::test]
    async fn test_description_is_normalized() {
        let (resolver, _) = resolver();
        let record = resolver.resolve("192.0.2.10").await.unwrap();
        assert_eq!(record.asn, "64500");
        assert_eq!(record.description, "example networks");
    }

    #[tokio::test]
    async fn test_second_address_served_from_cache() {
        let (resolver, registry) = resolver();
        resolver.resolve("192.0.2.10").await.unwrap();
        let cached = resolver.resolve(" 192.0.2.200 ").await.unwrap();
        assert_eq!(cached.description, "example networks");
        assert_eq!(registry.owner_calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.prefix_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_known_asn_skips_prefix_fetch() {
        let (resolver, registry) = resolver();
        resolver.resolve("192.0.2.10").await.unwrap();
        // Outside the announced /24 but owned by the same ASN
        resolver.resolve("203.0.113.1").await.unwrap();
        assert_eq!(registry.owner_calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.prefix_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_many_dedupes() {
        let (resolver, _) = resolver();
        let results = resolver
            .resolve_many(["192.0.2.1", "192.0.2.1", "10.0.0.1", "bogus"])
            .await;
        assert_eq!(results.len(), 3);
        assert!(results["192.0.2.1"].is_some());
        assert!(results["10.0.0.1"].is_none());
        assert!(results["bogus"].is_none());
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_prefix_fetch() {
        let registry = Arc::new(CountingRegistry::default());
        let resolver = Resolver::with_concurrency(Arc::new(Store::in_memory()), registry.clone(), 16);

        let ips: Vec<String> = (0..64).map(|i| format!("192.0.2.{i}")).collect();
        let results = resolver.resolve_many(ips).await;

        assert!(results.values().all(Option::is_some));
        assert_eq!(registry.prefix_calls.load(Ordering::SeqCst), 1);
        assert!(resolver.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_stream_pairs_inputs() {
        let (resolver, _) = resolver();
        let mut results: Vec<(&str, bool)> = resolver
            .resolve_stream(["192.0.2.1", "10.0.0.1"])
            .map(|(ip, result)| (ip, result.is_some()))
            .collect()
            .await;
        results.sort();
        assert_eq!(results, vec![("10.0.0.1", false), ("192.0.2.1", true)]);
    }

    #[test]
    fn test_concurrency_clamped() {
        let registry = Arc::new(CountingRegistry::default());
        let resolver = Resolver::with_concurrency(Arc::new(Store::in_memory()), registry, 0);
        assert!(format!("{resolver:?}").contains("concurrency: 1"));
    }
}
