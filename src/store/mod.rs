//! Resolution cache and its persistent store
//!
//! The [`Store`] owns the [`CidrIndex`], the per-ASN subnet sets that get
//! written to disk, and the dirty flag. All three live behind one mutex so
//! that every mutation keeps them consistent; nothing else holds a mutable
//! reference to the index.
//!
//! Each ASN remembers when it was first recorded. The cache file is written
//! and read back in that order, so overlapping subnets from different ASNs
//! resolve the same way after a reload as they did before it.

pub mod file;

use crate::asn::AsnRecord;
use crate::config::ResolverConfig;
use crate::index::CidrIndex;
use crate::registry::AnnouncedPrefixes;
use chrono::NaiveDate;
use file::{summarize_v4, summarize_v6, CacheEntry, CacheFile};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Errors raised while loading or saving the cache
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Cache file failed structural validation
    #[error("Cache file {} is corrupt: {reason}", .path.display())]
    Corrupt {
        /// Offending file
        path: PathBuf,
        /// What failed to parse
        reason: String,
    },

    /// Reading or writing the cache file failed
    #[error("Cache file {}: {source}", .path.display())]
    Io {
        /// Offending file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Cache could not be encoded
    #[error("Failed to encode cache: {0}")]
    Encode(String),
}

#[derive(Debug)]
struct AsnEntry {
    record: Arc<AsnRecord>,
    /// First-recorded position among all ASNs
    seq: u64,
    /// Subnets this ASN owns in the index
    ipv4: BTreeSet<Ipv4Net>,
    ipv6: BTreeSet<Ipv6Net>,
}

impl AsnEntry {
    fn new(record: Arc<AsnRecord>, seq: u64) -> Self {
        Self {
            record,
            seq,
            ipv4: BTreeSet::new(),
            ipv6: BTreeSet::new(),
        }
    }
}

#[derive(Debug)]
struct StoreState {
    index: CidrIndex,
    asns: BTreeMap<String, AsnEntry>,
    next_seq: u64,
    dirty: bool,
}

impl StoreState {
    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Cache of subnet ownership with optional file persistence
#[derive(Debug)]
pub struct Store {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

/// Today's date in local time
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

impl Store {
    /// Create an empty store that is never written to disk
    pub fn in_memory() -> Self {
        Self::with_index(None, CidrIndex::new())
    }

    fn with_index(path: Option<PathBuf>, index: CidrIndex) -> Self {
        Self {
            path,
            state: Mutex::new(StoreState {
                index,
                asns: BTreeMap::new(),
                next_seq: 0,
                dirty: false,
            }),
        }
    }

    /// Open the store described by `config`
    ///
    /// A missing file gives an empty store, and so does a file older than
    /// `max_age_days`. A file that fails to parse is an error.
    pub fn open(config: &ResolverConfig) -> Result<Self, StoreError> {
        Self::open_at(config, today())
    }

    /// Open the store as if the current date were `today`
    pub fn open_at(config: &ResolverConfig, today: NaiveDate) -> Result<Self, StoreError> {
        let index = CidrIndex::with_search(config.parallel_threshold, config.search_chunks);
        let store = Self::with_index(config.cache_path.clone(), index);

        let Some(path) = config.cache_path.as_deref() else {
            return Ok(store);
        };
        let Some(file) = read_cache_file(path)? else {
            tracing::debug!("No cache file at {}, starting empty", path.display());
            return Ok(store);
        };

        let age = file.age_days(today);
        if age > i64::from(config.max_age_days) {
            tracing::info!(
                "Cache file {} is {age} days old (max {}), starting empty",
                path.display(),
                config.max_age_days
            );
            return Ok(store);
        }

        store.load_entries(file);
        Ok(store)
    }

    fn load_entries(&self, file: CacheFile) {
        let mut state = self.state.lock().expect("mutex poisoned");
        for (asn, entry) in file.data {
            let record = Arc::new(AsnRecord::new(asn.clone(), &entry.description));
            let seq = state.take_seq();
            let mut loaded = AsnEntry::new(Arc::clone(&record), seq);
            loaded.ipv4.extend(entry.ipv4.iter().map(Ipv4Net::trunc));
            loaded.ipv6.extend(entry.ipv6.iter().map(Ipv6Net::trunc));

            let subnets = entry
                .ipv4
                .into_iter()
                .map(IpNet::V4)
                .chain(entry.ipv6.into_iter().map(IpNet::V6))
                .filter(|net| !crate::exclusion::is_catch_all(net));
            state.index.extend_unchecked(subnets, &record);
            state.asns.insert(asn, loaded);
        }
        let removed = state.index.remove_duplicates();
        if removed > 0 {
            tracing::debug!("Dropped {removed} duplicate subnets while loading cache");
        }
        tracing::info!(
            "Loaded {} ASNs, {} IPv4 and {} IPv6 subnets from cache",
            state.asns.len(),
            state.index.len_v4(),
            state.index.len_v6()
        );
    }

    /// Look an address up in the index
    pub fn lookup(&self, ip: IpAddr) -> Option<AsnRecord> {
        let state = self.state.lock().expect("mutex poisoned");
        state.index.lookup(ip).map(|record| (*record).clone())
    }

    /// Whether the announced prefixes of `asn` have already been recorded
    pub fn knows_asn(&self, asn: &str) -> bool {
        let state = self.state.lock().expect("mutex poisoned");
        state.asns.contains_key(asn)
    }

    /// Record the prefixes announced by an ASN
    ///
    /// Subnets already in the index keep their current owner and are not
    /// recorded for this ASN; catch-alls are skipped. A previously unknown
    /// ASN is recorded even with no prefixes. Returns the number of subnets
    /// added to the index; repeating a call with the same arguments adds
    /// nothing and leaves the dirty flag alone.
    pub fn add_subnets(&self, record: &AsnRecord, prefixes: &AnnouncedPrefixes) -> usize {
        let mut guard = self.state.lock().expect("mutex poisoned");
        let state = &mut *guard;

        let mut changed = false;
        if !state.asns.contains_key(&record.asn) {
            let seq = state.take_seq();
            state
                .asns
                .insert(record.asn.clone(), AsnEntry::new(Arc::new(record.clone()), seq));
            changed = true;
        }
        let Some(entry) = state.asns.get_mut(&record.asn) else {
            return 0;
        };
        let owner = Arc::clone(&entry.record);

        let mut added = 0;
        for net in prefixes.iter() {
            if crate::exclusion::is_catch_all(&net) {
                continue;
            }
            let net = net.trunc();
            if !state.index.insert(net, Arc::clone(&owner)) {
                continue;
            }
            added += 1;
            match net {
                IpNet::V4(v4) => entry.ipv4.insert(v4),
                IpNet::V6(v6) => entry.ipv6.insert(v6),
            };
        }
        changed |= added > 0;

        if changed {
            state.dirty = true;
            tracing::debug!(
                "AS{} - cached {added} new subnets ({} IPv4, {} IPv6 in index)",
                record.asn,
                state.index.len_v4(),
                state.index.len_v6()
            );
        }
        added
    }

    /// Build the summarized on-disk form dated `today`
    #[cfg(test)]
    pub(crate) fn to_cache_file(&self, today: NaiveDate) -> CacheFile {
        let state = self.state.lock().expect("mutex poisoned");
        build_cache_file(&state, today)
    }

    /// Write the store to its file if it was modified
    ///
    /// Returns `true` if the file was written. Memory-only stores and clean
    /// stores are left alone.
    pub fn save(&self) -> Result<bool, StoreError> {
        self.save_at(today())
    }

    /// Write the store, stamping it with `today`
    pub fn save_at(&self, today: NaiveDate) -> Result<bool, StoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(false);
        };

        let file = {
            let mut state = self.state.lock().expect("mutex poisoned");
            if !state.dirty {
                return Ok(false);
            }
            state.dirty = false;
            build_cache_file(&state, today)
        };

        if let Err(e) = write_cache_file(path, &file) {
            self.state.lock().expect("mutex poisoned").dirty = true;
            return Err(e);
        }
        tracing::debug!("Wrote summarized cache to {}", path.display());
        Ok(true)
    }

    /// Whether the store has unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.state.lock().expect("mutex poisoned").dirty
    }

    /// Number of subnets in the index
    pub fn len(&self) -> usize {
        self.state.lock().expect("mutex poisoned").index.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of ASNs recorded
    pub fn asn_count(&self) -> usize {
        self.state.lock().expect("mutex poisoned").asns.len()
    }

    /// Cache file path, if persistent
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn build_cache_file(state: &StoreState, today: NaiveDate) -> CacheFile {
    let mut ordered: Vec<(&String, &AsnEntry)> = state.asns.iter().collect();
    ordered.sort_by_key(|(_, entry)| entry.seq);
    let data = ordered
        .into_iter()
        .map(|(asn, entry)| {
            (
                asn.clone(),
                CacheEntry {
                    description: entry.record.description.clone(),
                    ipv4: summarize_v4(&entry.ipv4),
                    ipv6: summarize_v6(&entry.ipv6),
                },
            )
        })
        .collect();
    CacheFile {
        last_updated: today,
        data,
    }
}

fn read_cache_file(path: &Path) -> Result<Option<CacheFile>, StoreError> {
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    CacheFile::from_json(&json)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn write_cache_file(path: &Path, file: &CacheFile) -> Result<(), StoreError> {
    let json = file
        .to_json()
        .map_err(|e| StoreError::Encode(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn google() -> AsnRecord {
        AsnRecord::new("15169", "google")
    }

    fn prefixes(cidrs: &[&str]) -> AnnouncedPrefixes {
        AnnouncedPrefixes::from_cidrs(cidrs)
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_in_memory_starts_empty() {
        let store = Store::in_memory();
        assert!(store.is_empty());
        assert!(!store.is_dirty());
        assert_eq!(store.asn_count(), 0);
        assert!(store.path().is_none());
    }

    #[test]
    fn test_add_subnets_and_lookup() {
        let store = Store::in_memory();
        let added = store.add_subnets(&google(), &prefixes(&["8.8.8.0/24", "2001:4860::/32"]));
        assert_eq!(added, 2);
        assert!(store.is_dirty());
        assert!(store.knows_asn("15169"));
        assert_eq!(store.lookup(ip("8.8.8.8")), Some(google()));
        assert_eq!(store.lookup(ip("2001:4860::8888")), Some(google()));
        assert_eq!(store.lookup(ip("1.1.1.1")), None);
    }

    #[test]
    fn test_add_subnets_is_idempotent() {
        let store = Store::in_memory();
        let announced = prefixes(&["8.8.8.0/24", "8.8.4.0/24"]);
        store.add_subnets(&google(), &announced);
        let size = store.len();

        assert_eq!(store.add_subnets(&google(), &announced), 0);
        assert_eq!(store.len(), size);
    }

    #[test]
    fn test_repeat_add_does_not_redirty() {
        let dir = tempfile::tempdir().unwrap();
        let config = ResolverConfig::builder()
            .cache_path(dir.path().join("ripedb.json"))
            .build()
            .unwrap();
        let store = Store::open(&config).unwrap();
        let announced = prefixes(&["8.8.8.0/24"]);

        store.add_subnets(&google(), &announced);
        assert!(store.save().unwrap());
        assert!(!store.is_dirty());

        store.add_subnets(&google(), &announced);
        assert!(!store.is_dirty());
        assert!(!store.save().unwrap());
    }

    #[test]
    fn test_catch_all_never_cached() {
        let store = Store::in_memory();
        let mut announced = AnnouncedPrefixes::default();
        announced.ipv4.insert("0.0.0.0/0".parse().unwrap());
        announced.ipv6.insert("::/0".parse().unwrap());
        announced.ipv4.insert("1.1.1.0/24".parse().unwrap());

        assert_eq!(store.add_subnets(&AsnRecord::new("13335", "cloudflarenet"), &announced), 1);
        assert_eq!(store.lookup(ip("9.9.9.9")), None);
        let file = store.to_cache_file(today());
        let entry = file.entry("13335").unwrap();
        assert_eq!(entry.ipv4.len(), 1);
        assert!(entry.ipv6.is_empty());
    }

    #[test]
    fn test_unknown_asn_recorded_even_without_prefixes() {
        let store = Store::in_memory();
        assert_eq!(store.add_subnets(&google(), &AnnouncedPrefixes::default()), 0);
        assert!(store.knows_asn("15169"));
        assert!(store.is_dirty());
    }

    #[test]
    fn test_existing_owner_kept_for_overlapping_asn() {
        let store = Store::in_memory();
        store.add_subnets(&google(), &prefixes(&["8.8.8.0/24"]));
        let other = AsnRecord::new("64500", "other");
        assert_eq!(store.add_subnets(&other, &prefixes(&["8.8.8.0/24"])), 0);
        assert_eq!(store.lookup(ip("8.8.8.8")), Some(google()));
        // The shared subnet is only written under its owner
        let file = store.to_cache_file(today());
        assert_eq!(file.entry("15169").unwrap().ipv4.len(), 1);
        assert!(file.entry("64500").unwrap().ipv4.is_empty());
        let order: Vec<&str> = file.data.iter().map(|(asn, _)| asn.as_str()).collect();
        assert_eq!(order, vec!["15169", "64500"]);
    }

    #[test]
    fn test_save_memory_only_is_noop() {
        let store = Store::in_memory();
        store.add_subnets(&google(), &prefixes(&["8.8.8.0/24"]));
        assert!(!store.save().unwrap());
        assert!(store.is_dirty());
    }

    #[test]
    fn test_save_error_keeps_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let config = ResolverConfig::builder()
            .cache_path(dir.path().join("missing-dir").join("ripedb.json"))
            .build()
            .unwrap();
        let store = Store::open(&config).unwrap();
        store.add_subnets(&google(), &prefixes(&["8.8.8.0/24"]));

        assert!(matches!(store.save(), Err(StoreError::Io { .. })));
        assert!(store.is_dirty());
    }

    #[test]
    fn test_to_cache_file_summarizes() {
        let store = Store::in_memory();
        store.add_subnets(&google(), &prefixes(&["8.8.8.0/25", "8.8.8.128/25"]));
        assert_eq!(store.len(), 2);

        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let file = store.to_cache_file(date);
        assert_eq!(file.last_updated, date);
        let entry = file.entry("15169").unwrap();
        assert_eq!(entry.description, "google");
        assert_eq!(entry.ipv4, vec!["8.8.8.0/24".parse::<Ipv4Net>().unwrap()]);
    }
}
