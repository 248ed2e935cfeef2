use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::{Ipv4Net, Ipv6Net};

pub(crate) const V4_MAX_PREFIX: u8 = 32;
pub(crate) const V6_MAX_PREFIX: u8 = 128;

/// Prefixes longer than the family allows are clamped; the parser already
/// rejects them.
pub(crate) fn v4_contains(network: Ipv4Addr, prefix: u8, ip: Ipv4Addr) -> bool {
    Ipv4Net::new(network, prefix.min(V4_MAX_PREFIX))
        .map(|net| net.contains(&ip))
        .unwrap_or(false)
}

pub(crate) fn v6_contains(network: Ipv6Addr, prefix: u8, ip: Ipv6Addr) -> bool {
    Ipv6Net::new(network, prefix.min(V6_MAX_PREFIX))
        .map(|net| net.contains(&ip))
        .unwrap_or(false)
}

/// Address-family aware containment used by `a`, `mx` and `ptr` results.
pub(crate) fn contains(network: IpAddr, prefix4: u8, prefix6: u8, ip: IpAddr) -> bool {
    match (network, ip) {
        (IpAddr::V4(network), IpAddr::V4(ip)) => v4_contains(network, prefix4, ip),
        (IpAddr::V6(network), IpAddr::V6(ip)) => v6_contains(network, prefix6, ip),
        _ => false,
    }
}

/// IPv4-mapped IPv6 clients are evaluated as IPv4 (RFC 7208 §5).
pub(crate) fn canonical_client(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}
