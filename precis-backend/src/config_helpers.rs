use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Parse host:port into a SocketAddr, with fallback to 0.0.0.0.
pub fn parse_bind_address(host: &str, port: u16) -> SocketAddr {
    host.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .or_else(|_| host.parse::<SocketAddr>())
        .or_else(|_| host.parse::<Ipv6Addr>().map(|ip| SocketAddr::new(IpAddr::V6(ip), port)))
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)))
}

pub fn snapshot_path(cfg: &precis_config::Config) -> Option<PathBuf> {
    cfg.queue
        .snapshot_path
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

pub fn maintenance_interval(cfg: &precis_config::Config) -> Duration {
    Duration::from_secs(cfg.queue.snapshot_interval_secs)
}
