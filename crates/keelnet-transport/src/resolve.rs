use std::io;
use std::net::{IpAddr, SocketAddr};

use crate::TransportError;

/// Turns `host:port` into a socket address.
///
/// IP literals are used as-is without touching DNS. Host names go through
/// the system resolver; the first IPv4 answer wins, and IPv6 is used only
/// when no IPv4 address came back.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let resolve_failed = |source| TransportError::ResolveFailed {
        host: host.to_string(),
        source,
    };

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(resolve_failed)?
        .collect();

    let chosen = prefer_ipv4(&addrs).ok_or_else(|| {
        resolve_failed(io::Error::new(
            io::ErrorKind::NotFound,
            "no addresses returned",
        ))
    })?;
    tracing::debug!(host, %chosen, candidates = addrs.len(), "resolved host");
    Ok(chosen)
}

fn prefer_ipv4(addrs: &[SocketAddr]) -> Option<SocketAddr> {
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.iter().find(|a| a.is_ipv6()))
        .copied()
}
