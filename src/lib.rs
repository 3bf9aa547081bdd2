//! asnlog - resolve IP addresses found in logs to their owning ASN
//!
//! The core of the library is the resolution engine: a [`Store`] holding an
//! in-memory subnet index that is persisted between runs, a [`Registry`]
//! consulted on cache misses, and a [`Resolver`] that ties them together
//! under concurrent use. The [`Aggregator`] turns resolved addresses into
//! per-ASN counts.
//!
//! ```no_run
//! use asnlog::{RegistryClient, Resolver, ResolverConfig, Store};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ResolverConfig::builder().cache_path("ripedb.json").build()?;
//!     let store = Arc::new(Store::open(&config)?);
//!     let registry = Arc::new(RegistryClient::new(&config.registry)?);
//!     let resolver = Resolver::new(Arc::clone(&store), registry);
//!
//!     if let Some(record) = resolver.resolve("8.8.8.8").await {
//!         println!("{record}");
//!     }
//!     store.save()?;
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod asn;
pub mod config;
pub mod exclusion;
pub mod extract;
pub mod index;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod stats;
pub mod store;

pub use aggregate::{Aggregator, AsnSummary, ReportEntry, SortKey};
pub use asn::{AsnRecord, ResolutionResult};
pub use config::{RegistryConfig, ResolverConfig, ResolverConfigBuilder};
pub use exclusion::is_excluded;
pub use index::CidrIndex;
pub use registry::{AnnouncedPrefixes, LookupError, Registry, RegistryClient};
pub use resolver::Resolver;
pub use store::{Store, StoreError};
