//! In-memory CIDR index
//!
//! Maps subnets to their owning [`AsnRecord`]. Each address family is kept
//! in its own list in insertion order, and a lookup returns the record of the
//! first subnet (in that order) containing the address. Lookups never look
//! at the other family's subnets.

pub mod search;

use crate::asn::AsnRecord;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::collections::HashSet;
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::Arc;

/// Default family size above which lookups use the parallel chunk search
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;
/// Default number of chunks for the parallel search
pub const DEFAULT_SEARCH_CHUNKS: usize = 8;

/// Subnets of one address family, in insertion order
#[derive(Debug, Clone)]
struct FamilyIndex<N> {
    entries: Vec<(N, Arc<AsnRecord>)>,
    known: HashSet<N>,
}

impl<N: Copy + Eq + Hash> FamilyIndex<N> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            known: HashSet::new(),
        }
    }

    fn insert(&mut self, net: N, record: Arc<AsnRecord>) -> bool {
        if !self.known.insert(net) {
            return false;
        }
        self.entries.push((net, record));
        true
    }

    fn push_unchecked(&mut self, net: N, record: Arc<AsnRecord>) {
        self.known.insert(net);
        self.entries.push((net, record));
    }

    fn remove_duplicates(&mut self) -> usize {
        let before = self.entries.len();
        let mut seen = HashSet::with_capacity(before);
        self.entries.retain(|(net, _)| seen.insert(*net));
        self.known = seen;
        before - self.entries.len()
    }
}

/// Subnet → ASN index partitioned by address family
#[derive(Debug, Clone)]
pub struct CidrIndex {
    v4: FamilyIndex<Ipv4Net>,
    v6: FamilyIndex<Ipv6Net>,
    parallel_threshold: usize,
    search_chunks: usize,
}

impl CidrIndex {
    /// Create an empty index with default search settings
    pub fn new() -> Self {
        Self::with_search(DEFAULT_PARALLEL_THRESHOLD, DEFAULT_SEARCH_CHUNKS)
    }

    /// Create an empty index with explicit parallel search settings
    ///
    /// Families holding at least `parallel_threshold` subnets are searched in
    /// `search_chunks` parallel chunks.
    pub fn with_search(parallel_threshold: usize, search_chunks: usize) -> Self {
        Self {
            v4: FamilyIndex::new(),
            v6: FamilyIndex::new(),
            parallel_threshold,
            search_chunks: search_chunks.max(1),
        }
    }

    /// Find the record of the first subnet containing `ip`
    pub fn lookup(&self, ip: IpAddr) -> Option<Arc<AsnRecord>> {
        match ip {
            IpAddr::V4(addr) => {
                let pos = self.find(&self.v4.entries, |(net, _)| net.contains(&addr))?;
                Some(Arc::clone(&self.v4.entries[pos].1))
            }
            IpAddr::V6(addr) => {
                let pos = self.find(&self.v6.entries, |(net, _)| net.contains(&addr))?;
                Some(Arc::clone(&self.v6.entries[pos].1))
            }
        }
    }

    fn find<T, F>(&self, entries: &[T], matches: F) -> Option<usize>
    where
        T: Sync,
        F: Fn(&T) -> bool + Sync,
    {
        if entries.len() >= self.parallel_threshold && self.search_chunks > 1 {
            search::first_match(entries, self.search_chunks, matches)
        } else {
            search::first_match_sequential(entries, matches)
        }
    }

    /// Insert a subnet, truncated to its network address
    ///
    /// Returns `false` if the subnet is already present; the existing owner
    /// is kept.
    pub fn insert(&mut self, subnet: IpNet, record: Arc<AsnRecord>) -> bool {
        match subnet.trunc() {
            IpNet::V4(net) => self.v4.insert(net, record),
            IpNet::V6(net) => self.v6.insert(net, record),
        }
    }

    /// Append subnets without checking for duplicates
    ///
    /// Used for bulk loading; follow with [`CidrIndex::remove_duplicates`].
    pub fn extend_unchecked<I>(&mut self, subnets: I, record: &Arc<AsnRecord>)
    where
        I: IntoIterator<Item = IpNet>,
    {
        for subnet in subnets {
            match subnet.trunc() {
                IpNet::V4(net) => self.v4.push_unchecked(net, Arc::clone(record)),
                IpNet::V6(net) => self.v6.push_unchecked(net, Arc::clone(record)),
            }
        }
    }

    /// Drop repeated subnets, keeping each one's first occurrence
    ///
    /// Returns the number of entries removed.
    pub fn remove_duplicates(&mut self) -> usize {
        self.v4.remove_duplicates() + self.v6.remove_duplicates()
    }

    /// Total number of subnets
    pub fn len(&self) -> usize {
        self.v4.entries.len() + self.v6.entries.len()
    }

    /// Number of IPv4 subnets
    pub fn len_v4(&self) -> usize {
        self.v4.entries.len()
    }

    /// Number of IPv6 subnets
    pub fn len_v6(&self) -> usize {
        self.v6.entries.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CidrIndex {
    fn default() -> Self {
        Self::new()
    }
}
