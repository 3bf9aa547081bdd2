//! Announced-prefix lookup using the RIPEstat data API

use super::{AnnouncedPrefixes, LookupError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct AnnouncedPrefixesResponse {
    data: AnnouncedPrefixesData,
}

#[derive(Debug, Deserialize)]
struct AnnouncedPrefixesData {
    #[serde(default)]
    prefixes: Vec<PrefixEntry>,
}

#[derive(Debug, Deserialize)]
struct PrefixEntry {
    prefix: String,
}

/// Parse an announced-prefixes response body
pub fn parse_announced_prefixes(body: &str) -> Result<AnnouncedPrefixes, LookupError> {
    let response: AnnouncedPrefixesResponse =
        serde_json::from_str(body).map_err(|e| LookupError::InvalidFormat(e.to_string()))?;
    Ok(AnnouncedPrefixes::from_cidrs(
        response.data.prefixes.into_iter().map(|p| p.prefix),
    ))
}

/// RIPEstat client sharing one pooled HTTP client
#[derive(Debug, Clone)]
pub struct RipeStat {
    client: reqwest::Client,
    url: String,
}

impl RipeStat {
    /// Create a client for the given endpoint
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Fetch every prefix announced by `asn`
    pub async fn announced_prefixes(&self, asn: &str) -> Result<AnnouncedPrefixes, LookupError> {
        tracing::debug!("AS{asn} - downloading announced prefixes");
        let response = self
            .client
            .get(&self.url)
            .query(&[("resource", asn)])
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(map_reqwest_error)?;
        let prefixes = parse_announced_prefixes(&body)?;
        tracing::debug!(
            "AS{asn} - {} IPv4 and {} IPv6 prefixes announced",
            prefixes.ipv4.len(),
            prefixes.ipv6.len()
        );
        Ok(prefixes)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> LookupError {
    if e.is_timeout() {
        LookupError::Timeout
    } else if e.is_decode() {
        LookupError::InvalidFormat(e.to_string())
    } else {
        LookupError::Http(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_announced_prefixes() {
        let body = r#"{
            "status": "ok",
            "data": {
                "prefixes": [
                    {"prefix": "8.8.8.0/24", "timelines": []},
                    {"prefix": "8.8.4.0/24"},
                    {"prefix": "2001:4860::/32"},
                    {"prefix": "0.0.0.0/0"}
                ],
                "resource": "15169"
            }
        }"#;
        let prefixes = parse_announced_prefixes(body).unwrap();
        assert_eq!(prefixes.ipv4.len(), 2);
        assert_eq!(prefixes.ipv6.len(), 1);
    }

    #[test]
    fn test_parse_missing_prefixes_is_empty() {
        let prefixes = parse_announced_prefixes(r#"{"data": {}}"#).unwrap();
        assert!(prefixes.is_empty());
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_announced_prefixes("not json"),
            Err(LookupError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_announced_prefixes(r#"{"status": "ok"}"#),
            Err(LookupError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_announced_prefixes(r#"{"data": {"prefixes": [{"no": "prefix"}]}}"#),
            Err(LookupError::InvalidFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(500))
            .build()
            .unwrap();
        // Port 9 (discard) on localhost is almost never listening
        let ripe = RipeStat::new(client, "http://127.0.0.1:9/data.json");
        let result = ripe.announced_prefixes("15169").await;
        assert!(result.is_err());
    }
}
