//! Security policy for gateway URLs.
//!
//! A bearer token may travel over `https` anywhere, but over plain `http`
//! only to loopback, private or link-local hosts.

use std::net::{IpAddr, Ipv6Addr, ToSocketAddrs};

use tracing::debug;
use url::{Host, Url};

/// Returns `true` if `url` is safe to use for a token-bearing connection.
///
/// Blank input, unparseable input, schemes other than `http`/`https` and
/// hosts that fail to resolve all yield `false`. Resolving a host name is a
/// blocking DNS lookup.
pub fn is_secure(url: &str) -> bool {
    if url.trim().is_empty() {
        return false;
    }

    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(e) => {
            debug!(error = %e, "gateway url does not parse");
            return false;
        }
    };

    match parsed.scheme() {
        "https" => true,
        "http" => http_host_is_local(&parsed),
        _ => false,
    }
}

fn http_host_is_local(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) if domain.eq_ignore_ascii_case("localhost") => true,
        Some(Host::Domain(domain)) => {
            resolves_locally(domain, url.port_or_known_default().unwrap_or(80))
        }
        Some(Host::Ipv4(addr)) => is_local_address(IpAddr::V4(addr)),
        Some(Host::Ipv6(addr)) => is_local_address(IpAddr::V6(addr)),
        None => false,
    }
}

fn resolves_locally(domain: &str, port: u16) -> bool {
    match (domain, port).to_socket_addrs() {
        Ok(addrs) => all_local(addrs.map(|a| a.ip())),
        Err(e) => {
            debug!(domain, error = %e, "gateway host does not resolve");
            false
        }
    }
}

/// Every resolved address must be local; an empty answer is not.
fn all_local(addrs: impl IntoIterator<Item = IpAddr>) -> bool {
    let mut addrs = addrs.into_iter().peekable();
    addrs.peek().is_some() && addrs.all(is_local_address)
}

/// Loopback, private (RFC 1918) or link-local.
pub fn is_local_address(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_local_address(IpAddr::V4(v4)),
            None => v6.is_loopback() || is_ipv6_link_local(&v6) || is_ipv6_site_local(&v6),
        },
    }
}

// fe80::/10
fn is_ipv6_link_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

// fec0::/10
fn is_ipv6_site_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfec0
}
