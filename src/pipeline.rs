//! Resolve collected addresses and feed the aggregator

use crate::aggregate::Aggregator;
use crate::resolver::Resolver;
use crate::stats::PhaseStats;
use futures::StreamExt;
use std::collections::HashMap;

/// Hit counts per address, in first-seen order
#[derive(Debug, Default, Clone)]
pub struct HitCounts {
    order: Vec<String>,
    counts: HashMap<String, u64>,
}

impl HitCounts {
    /// Create an empty counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one hit for `ip`
    pub fn add(&mut self, ip: &str) {
        match self.counts.get_mut(ip) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(ip.to_string(), 1);
                self.order.push(ip.to_string());
            }
        }
    }

    /// Distinct addresses
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if no address was counted
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Hits counted for `ip`
    pub fn count(&self, ip: &str) -> u64 {
        self.counts.get(ip).copied().unwrap_or_default()
    }

    /// Sum of all hits
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Addresses with their hit counts, in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.order
            .iter()
            .map(|ip| (ip.as_str(), self.count(ip)))
    }
}

/// Resolve every counted address and record its hits
///
/// Runs at the resolver's concurrency. Addresses that do not resolve are
/// recorded under an empty ASN and description. Returns the number of
/// addresses that resolved.
pub async fn resolve_and_tally(
    resolver: &Resolver,
    hits: &HitCounts,
    aggregator: &Aggregator,
    mut stats: Option<&mut PhaseStats>,
) -> usize {
    let mut results = std::pin::pin!(resolver.resolve_stream(hits.iter().map(|(ip, _)| ip)));

    let mut resolved = 0;
    while let Some((ip, result)) = results.next().await {
        let count = hits.count(ip);
        match result {
            Some(record) => {
                resolved += 1;
                aggregator.add_hits(&record.asn, &record.description, ip, count);
            }
            None => aggregator.add_hits("", "", ip, count),
        }
        if let Some(stats) = stats.as_deref_mut() {
            stats.tick();
        }
    }
    resolved
}
