//! Trusted proxy and host lists.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use thiserror::Error;

/// A proxy entry that is neither an address nor a CIDR range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid proxy address or range {0:?}")]
pub struct InvalidProxyNetwork(pub String);

/// A trusted proxy range. A bare address is a one-address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyNetwork {
    network: IpAddr,
    prefix: u8,
}

impl ProxyNetwork {
    /// Build a range, masking host bits off `addr`.
    ///
    /// Returns `None` when `prefix` is longer than the address family allows.
    pub fn new(addr: IpAddr, prefix: u8) -> Option<Self> {
        let network = match addr {
            IpAddr::V4(v4) if prefix <= 32 => {
                IpAddr::V4(Ipv4Addr::from(u32::from(v4) & v4_mask(prefix)))
            }
            IpAddr::V6(v6) if prefix <= 128 => {
                IpAddr::V6(Ipv6Addr::from(u128::from(v6) & v6_mask(prefix)))
            }
            _ => return None,
        };
        Some(Self { network, prefix })
    }

    /// The network address.
    pub fn network(&self) -> IpAddr {
        self.network
    }

    /// The prefix length.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether `addr` falls inside the range. Families never mix.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                u32::from(*ip) & v4_mask(self.prefix) == u32::from(net)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                u128::from(*ip) & v6_mask(self.prefix) == u128::from(net)
            }
            _ => false,
        }
    }
}

impl From<IpAddr> for ProxyNetwork {
    fn from(addr: IpAddr) -> Self {
        let prefix = if addr.is_ipv4() { 32 } else { 128 };
        Self {
            network: addr,
            prefix,
        }
    }
}

impl FromStr for ProxyNetwork {
    type Err = InvalidProxyNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidProxyNetwork(s.to_string());
        match s.split_once('/') {
            Some((addr, prefix)) => {
                let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
                if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
                Self::new(addr, prefix).ok_or_else(invalid)
            }
            None => s.parse::<IpAddr>().map(Self::from).map_err(|_| invalid()),
        }
    }
}

fn v4_mask(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
}

fn v6_mask(prefix: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0)
}

/// Which peers may vouch for the client address and which hosts are served.
///
/// Read once when the worker boots and shared by every request it handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustPolicy {
    /// Proxy ranges whose `X-Forwarded-For` is believed.
    pub trusted_proxies: Vec<ProxyNetwork>,
    /// Accepted hosts. A leading `.` matches any subdomain. Empty accepts all.
    pub trusted_hosts: Vec<String>,
}

impl TrustPolicy {
    /// Create a policy.
    pub fn new(trusted_proxies: Vec<ProxyNetwork>, trusted_hosts: Vec<String>) -> Self {
        Self {
            trusted_proxies,
            trusted_hosts,
        }
    }

    /// Parse comma-separated lists as found in environment variables.
    ///
    /// Proxy entries may be addresses or CIDR ranges. Entries that are
    /// neither are dropped from the proxy list and returned so the caller can
    /// report them.
    pub fn from_lists(proxies: &str, hosts: &str) -> (Self, Vec<String>) {
        let mut rejected = Vec::new();
        let trusted_proxies = split_list(proxies)
            .filter_map(|entry| match entry.parse::<ProxyNetwork>() {
                Ok(network) => Some(network),
                Err(_) => {
                    rejected.push(entry.to_string());
                    None
                }
            })
            .collect();
        let trusted_hosts = split_list(hosts).map(|h| h.to_ascii_lowercase()).collect();

        (Self::new(trusted_proxies, trusted_hosts), rejected)
    }

    /// Whether `peer` lies in a trusted proxy range.
    pub fn is_trusted_proxy(&self, peer: &IpAddr) -> bool {
        self.trusted_proxies.iter().any(|network| network.contains(peer))
    }

    /// Whether `host` is accepted.
    pub fn is_trusted_host(&self, host: &str) -> bool {
        if self.trusted_hosts.is_empty() {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.trusted_hosts.iter().any(|pattern| match pattern.strip_prefix('.') {
            Some(suffix) => host == suffix || host.ends_with(pattern.as_str()),
            None => &host == pattern,
        })
    }
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}
