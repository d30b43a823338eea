// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Structural IPv4 validation shared by both enforcement sinks and the
//! LAPI decision decoder. `std::net::Ipv4Addr`'s parser already rejects
//! anything but four dot-separated decimal octets 0-255, matching the
//! structural check called for in SPEC_FULL.md §4.2; CIDR suffixes are
//! handled separately since `Ipv4Addr` has no notion of a prefix length.

use std::net::Ipv4Addr;

/// True if `s` is a bare IPv4 host address (no CIDR suffix).
pub fn is_valid_ipv4_host(s: &str) -> bool {
    s.parse::<Ipv4Addr>().is_ok()
}

/// True if `s` is a bare IPv4 host address or an IPv4/CIDR literal
/// with a prefix length in 0..=32.
pub fn is_valid_ipv4_or_cidr(s: &str) -> bool {
    match s.split_once('/') {
        None => is_valid_ipv4_host(s),
        Some((addr, prefix)) => {
            is_valid_ipv4_host(addr) && prefix.parse::<u8>().is_ok_and(|p| p <= 32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_host_addresses() {
        assert!(is_valid_ipv4_host("203.0.113.5"));
        assert!(!is_valid_ipv4_host("203.0.113.5/32"));
        assert!(!is_valid_ipv4_host("not.an.ip.addr"));
        assert!(!is_valid_ipv4_host("256.0.0.1"));
        assert!(!is_valid_ipv4_host("::1"));
    }

    #[test]
    fn validates_cidr_literals() {
        assert!(is_valid_ipv4_or_cidr("203.0.113.0/24"));
        assert!(is_valid_ipv4_or_cidr("203.0.113.5"));
        assert!(!is_valid_ipv4_or_cidr("203.0.113.0/33"));
        assert!(!is_valid_ipv4_or_cidr("bogus/24"));
    }
}
