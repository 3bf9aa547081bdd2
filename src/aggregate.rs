//! Per-ASN hit aggregation
//!
//! Counts every resolved log hit against its (ASN, description) pair and
//! keeps the set of distinct addresses plus a short sample list for display.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::Mutex;

/// Number of sample addresses kept per ASN
pub const SAMPLE_SIZE: usize = 3;

/// Column used to order summaries (always descending)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// AS number
    Asn,
    /// Number of distinct addresses
    #[default]
    UniqueIps,
    /// Number of log hits
    TotalHits,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asn" | "bgp asn" => Ok(SortKey::Asn),
            "ip-count" | "ip count" | "unique" | "unique-ips" => Ok(SortKey::UniqueIps),
            "total-hits" | "total entries" | "total-entries" | "hits" => Ok(SortKey::TotalHits),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

/// One row of the summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsnSummary {
    /// AS number (empty when unresolved)
    pub asn: String,
    /// AS description (empty when unresolved)
    pub description: String,
    /// Distinct addresses seen
    pub unique_ip_count: usize,
    /// Every hit, repeated addresses included
    pub total_hits: u64,
    /// Most recently first-seen addresses, oldest first
    pub sample_ips: Vec<String>,
}

/// Entry of the JSON report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    /// Every hit for the ASN
    pub total_log_entries: u64,
    /// Distinct addresses, sorted
    pub ips: Vec<String>,
}

#[derive(Debug, Default)]
struct Tally {
    total_hits: u64,
    ips: HashSet<String>,
    samples: VecDeque<String>,
}

/// Thread-safe hit counter keyed by (ASN, description)
#[derive(Debug, Default)]
pub struct Aggregator {
    tallies: Mutex<HashMap<(String, String), Tally>>,
}

impl Aggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one hit
    pub fn add(&self, asn: &str, description: &str, ip: &str) {
        self.add_hits(asn, description, ip, 1);
    }

    /// Record `hits` hits from the same address
    pub fn add_hits(&self, asn: &str, description: &str, ip: &str, hits: u64) {
        if hits == 0 {
            return;
        }
        let mut tallies = self.tallies.lock().expect("mutex poisoned");
        let tally = tallies
            .entry((asn.to_string(), description.to_string()))
            .or_default();
        tally.total_hits += hits;
        if tally.ips.insert(ip.to_string()) {
            if tally.samples.len() == SAMPLE_SIZE {
                tally.samples.pop_front();
            }
            tally.samples.push_back(ip.to_string());
        }
    }

    /// Number of distinct (ASN, description) pairs
    pub fn len(&self) -> usize {
        self.tallies.lock().expect("mutex poisoned").len()
    }

    /// Check if nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summaries ordered by `sort_key`, highest first
    ///
    /// Ties on unique addresses fall back to total hits and the reverse;
    /// remaining ties go to the ASN, and ties on ASN to the description.
    pub fn summarize(&self, sort_key: SortKey) -> Vec<AsnSummary> {
        let tallies = self.tallies.lock().expect("mutex poisoned");
        let mut rows: Vec<AsnSummary> = tallies
            .iter()
            .map(|((asn, description), tally)| AsnSummary {
                asn: asn.clone(),
                description: description.clone(),
                unique_ip_count: tally.ips.len(),
                total_hits: tally.total_hits,
                sample_ips: tally.samples.iter().cloned().collect(),
            })
            .collect();
        drop(tallies);

        rows.sort_by(|a, b| compare(a, b, sort_key).reverse());
        rows
    }

    /// JSON report keyed by `"<asn>_<description>"`
    pub fn report(&self) -> BTreeMap<String, ReportEntry> {
        let tallies = self.tallies.lock().expect("mutex poisoned");
        tallies
            .iter()
            .map(|((asn, description), tally)| {
                let mut ips: Vec<String> = tally.ips.iter().cloned().collect();
                ips.sort();
                (
                    format!("{asn}_{description}"),
                    ReportEntry {
                        total_log_entries: tally.total_hits,
                        ips,
                    },
                )
            })
            .collect()
    }
}

fn compare_asn(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

fn compare(a: &AsnSummary, b: &AsnSummary, key: SortKey) -> Ordering {
    let by_asn = || {
        compare_asn(&a.asn, &b.asn).then_with(|| a.description.cmp(&b.description))
    };
    match key {
        SortKey::Asn => by_asn(),
        SortKey::UniqueIps => a
            .unique_ip_count
            .cmp(&b.unique_ip_count)
            .then(a.total_hits.cmp(&b.total_hits))
            .then_with(by_asn),
        SortKey::TotalHits => a
            .total_hits
            .cmp(&b.total_hits)
            .then(a.unique_ip_count.cmp(&b.unique_ip_count))
            .then_with(by_asn),
    }
}
