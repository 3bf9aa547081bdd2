//! ASN (Autonomous System Number) records

pub mod record;

pub use record::{normalize_description, AsnRecord};

/// Result of resolving one address: `None` when excluded or unresolvable
pub type ResolutionResult = Option<AsnRecord>;
