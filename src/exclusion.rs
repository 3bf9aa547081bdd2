//! Non-routable address filtering
//!
//! Addresses in private, special-use, multicast and similar ranges never
//! belong to a public ASN, so they are rejected before any cache lookup or
//! registry query.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use once_cell::sync::Lazy;
use std::net::IpAddr;

const EXCLUDED_IPV4: &[&str] = &[
    // Private
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    // Special-use
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    // Multicast / broadcast
    "224.0.0.0/4",
    "255.255.255.255/32",
];

const EXCLUDED_IPV6: &[&str] = &[
    "fc00::/7",  // Unique local
    "fe80::/10", // Link local
    "ff00::/8",  // Multicast
    "::/128",    // Unspecified
    "::1/128",   // Loopback
];

static IPV4_TABLE: Lazy<Vec<Ipv4Net>> = Lazy::new(|| {
    EXCLUDED_IPV4
        .iter()
        .filter_map(|net| net.parse().ok())
        .collect()
});

static IPV6_TABLE: Lazy<Vec<Ipv6Net>> = Lazy::new(|| {
    EXCLUDED_IPV6
        .iter()
        .filter_map(|net| net.parse().ok())
        .collect()
});

/// Check whether an address falls in a non-routable range
pub fn is_excluded(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => IPV4_TABLE.iter().any(|net| net.contains(&v4)),
        IpAddr::V6(v6) => IPV6_TABLE.iter().any(|net| net.contains(&v6)),
    }
}

/// Check whether a subnet is a catch-all (`0.0.0.0/0` or `::/0`)
///
/// A catch-all in the index would match every address of its family.
pub fn is_catch_all(net: &IpNet) -> bool {
    net.prefix_len() == 0
}
