// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host name resolution for cluster commands.
//!
//! Commands accept raw host names or address literals; everything past
//! option validation works with resolved addresses only, so resolution
//! happens exactly once, up front.

use std::collections::HashSet;
use std::net::{IpAddr, ToSocketAddrs};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cannot resolve host {host:?}: {reason}")]
    Unresolvable { host: String, reason: String },
    #[error("host {host:?} has no {family} address")]
    NoAddressForFamily { host: String, family: &'static str },
    #[error("host list contains duplicate address {address}")]
    DuplicateAddress { address: String },
    #[error("malformed {what} entry {entry:?}, expected NAME=HOST")]
    MalformedPair { what: &'static str, entry: String },
}

fn family_name(ipv6: bool) -> &'static str {
    if ipv6 { "IPv6" } else { "IPv4" }
}

/// Resolve a single raw host to one address of the requested family.
///
/// Address literals are accepted as-is when the family matches.
pub fn resolve_to_one_ip(raw_host: &str, ipv6: bool) -> Result<String, ResolveError> {
    if let Ok(addr) = raw_host.parse::<IpAddr>() {
        if addr.is_ipv6() == ipv6 {
            return Ok(addr.to_string());
        }
        return Err(ResolveError::NoAddressForFamily {
            host: raw_host.to_string(),
            family: family_name(ipv6),
        });
    }

    // Port 0 satisfies ToSocketAddrs; only the address part is kept.
    let addrs = (raw_host, 0u16).to_socket_addrs().map_err(|e| {
        ResolveError::Unresolvable { host: raw_host.to_string(), reason: e.to_string() }
    })?;
    addrs
        .map(|sockaddr| sockaddr.ip())
        .find(|ip| ip.is_ipv6() == ipv6)
        .map(|ip| ip.to_string())
        .ok_or_else(|| ResolveError::NoAddressForFamily {
            host: raw_host.to_string(),
            family: family_name(ipv6),
        })
}

/// Resolve a list of raw hosts, preserving input order.
///
/// Two raw hosts resolving to the same address is a caller error; the
/// coordination model requires host addresses to be unique keys.
pub fn resolve_raw_hosts(raw_hosts: &[String], ipv6: bool) -> Result<Vec<String>, ResolveError> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(raw_hosts.len());
    for raw in raw_hosts {
        let address = resolve_to_one_ip(raw, ipv6)?;
        if !seen.insert(address.clone()) {
            return Err(ResolveError::DuplicateAddress { address });
        }
        resolved.push(address);
    }
    Ok(resolved)
}

/// Parse a `NAME=HOST,NAME=HOST` list (re-ip files, restart_node input)
/// into ordered pairs. The HOST side is resolved.
pub fn parse_node_address_pairs(
    list: &str,
    what: &'static str,
    ipv6: bool,
) -> Result<Vec<(String, String)>, ResolveError> {
    let mut pairs = Vec::new();
    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, host) = entry
            .split_once('=')
            .filter(|(name, host)| !name.is_empty() && !host.is_empty())
            .ok_or_else(|| ResolveError::MalformedPair { what, entry: entry.to_string() })?;
        pairs.push((name.to_string(), resolve_to_one_ip(host.trim(), ipv6)?));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_addresses_pass_through() {
        assert_eq!(resolve_to_one_ip("192.0.2.1", false).unwrap(), "192.0.2.1");
        assert_eq!(resolve_to_one_ip("2001:db8::1", true).unwrap(), "2001:db8::1");
    }

    #[test]
    fn family_mismatch_is_rejected() {
        let err = resolve_to_one_ip("192.0.2.1", true).unwrap_err();
        assert!(matches!(err, ResolveError::NoAddressForFamily { .. }));
    }

    #[test]
    fn duplicate_addresses_are_rejected() {
        let raw = vec!["192.0.2.1".to_string(), "192.0.2.1".to_string()];
        let err = resolve_raw_hosts(&raw, false).unwrap_err();
        assert!(matches!(err, ResolveError::DuplicateAddress { .. }));
    }

    #[test]
    fn node_address_pairs_parse() {
        let pairs =
            parse_node_address_pairs("n1=192.0.2.1, n2=192.0.2.2", "re-ip", false).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("n1".to_string(), "192.0.2.1".to_string()),
                ("n2".to_string(), "192.0.2.2".to_string()),
            ]
        );
        assert!(parse_node_address_pairs("n1", "re-ip", false).is_err());
        assert!(parse_node_address_pairs("=192.0.2.1", "re-ip", false).is_err());
    }
}
