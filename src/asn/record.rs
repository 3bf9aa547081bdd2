//! ASN ownership records

use serde::{Deserialize, Serialize};
use std::fmt;

/// Owner of an address: AS number and a normalized description
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AsnRecord {
    /// AS number, without the `AS` prefix (e.g. "15169")
    pub asn: String,
    /// Normalized AS description (e.g. "google")
    #[serde(rename = "asn_description")]
    pub description: String,
}

impl AsnRecord {
    /// Build a record, normalizing the description
    pub fn new(asn: impl Into<String>, description: &str) -> Self {
        Self {
            asn: asn.into().trim().to_string(),
            description: normalize_description(description),
        }
    }

    /// Return the record with its description normalized
    ///
    /// Records coming from a [`crate::registry::Registry`] implementation are
    /// passed through this before they reach the cache, so a registry that
    /// forgets to normalize cannot split one ASN into several cache keys.
    pub fn normalized(self) -> Self {
        Self::new(self.asn, &self.description)
    }
}

impl fmt::Display for AsnRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AS{} ({})", self.asn, self.description)
    }
}

/// Normalize a registry description
///
/// Keeps the text before the first comma, trims it and lower-cases it:
/// `"GOOGLE, US"` becomes `"google"`.
pub fn normalize_description(raw: &str) -> String {
    raw.split(',').next().unwrap_or_default().trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_description() {
        assert_eq!(normalize_description("GOOGLE, US"), "google");
        assert_eq!(normalize_description("google, llc"), "google");
        assert_eq!(
            normalize_description("  CLOUDFLARENET - Cloudflare, Inc., US "),
            "cloudflarenet - cloudflare"
        );
        assert_eq!(normalize_description("NO-COMMA"), "no-comma");
        assert_eq!(normalize_description(""), "");
        assert_eq!(normalize_description(", leading comma"), "");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let once = normalize_description("Amazon-02, US");
        assert_eq!(normalize_description(&once), once);
    }

    #[test]
    fn test_record_new_normalizes() {
        let record = AsnRecord::new(" 15169 ", "Google, LLC");
        assert_eq!(record.asn, "15169");
        assert_eq!(record.description, "google");

        let raw = AsnRecord {
            asn: "13335".to_string(),
            description: "CLOUDFLARENET, US".to_string(),
        };
        assert_eq!(raw.normalized().description, "cloudflarenet");
    }

    #[test]
    fn test_record_serializes_with_legacy_key() {
        let record = AsnRecord::new("15169", "google");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["asn"], "15169");
        assert_eq!(json["asn_description"], "google");
    }

    #[test]
    fn test_display() {
        let record = AsnRecord::new("15169", "google");
        assert_eq!(record.to_string(), "AS15169 (google)");
    }
}
