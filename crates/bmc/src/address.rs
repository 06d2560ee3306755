//! Internal/external address classification using RFC 1918 / RFC 4193
//! private-range checks rather than a hand-rolled prefix match.

use ipnet::{Ipv4Net, Ipv6Net};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::LazyLock;

static RFC1918_NETS: LazyLock<[Ipv4Net; 3]> = LazyLock::new(|| {
    [
        Ipv4Net::from_str("10.0.0.0/8").expect("valid literal"),
        Ipv4Net::from_str("172.16.0.0/12").expect("valid literal"),
        Ipv4Net::from_str("192.168.0.0/16").expect("valid literal"),
    ]
});

static RFC4193_NET: LazyLock<Ipv6Net> =
    LazyLock::new(|| Ipv6Net::from_str("fc00::/7").expect("valid literal"));

/// True if `address` falls in an RFC 1918 (IPv4) or RFC 4193 (IPv6 unique
/// local) private range. Malformed input is treated as external.
#[must_use]
pub fn is_internal_address(address: &str) -> bool {
    match IpAddr::from_str(address) {
        Ok(IpAddr::V4(v4)) => RFC1918_NETS.iter().any(|net| net.contains(&v4)),
        Ok(IpAddr::V6(v6)) => RFC4193_NET.contains(&v6),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rfc1918_ranges_as_internal() {
        assert!(is_internal_address("10.1.2.3"));
        assert!(is_internal_address("172.16.0.1"));
        assert!(is_internal_address("192.168.1.1"));
    }

    #[test]
    fn classifies_public_ipv4_as_external() {
        assert!(!is_internal_address("8.8.8.8"));
    }

    #[test]
    fn classifies_rfc4193_as_internal() {
        assert!(is_internal_address("fd12:3456:789a::1"));
    }

    #[test]
    fn classifies_public_ipv6_as_external() {
        assert!(!is_internal_address("2001:4860:4860::8888"));
    }

    #[test]
    fn malformed_address_is_external() {
        assert!(!is_internal_address("not-an-ip"));
    }
}
