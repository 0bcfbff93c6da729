//! Host network link
//!
//! A desktop host has no WiFi radio of its own to drive; the OS owns
//! association. The link counts as up while the routing table has a way to
//! reach the mDNS multicast group.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use super::WifiLink;
use crate::config::WifiCredential;

/// Probe target; only routed, never sent to
const PROBE_TARGET: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(224, 0, 0, 251)), 5353);

/// Minimum time between route probes
const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// [`WifiLink`] that follows the host's routing table
#[derive(Debug)]
pub struct RouteLink {
    last_probe: Option<Instant>,
    local: Option<IpAddr>,
}

impl RouteLink {
    #[must_use]
    pub fn new(candidates: &[WifiCredential]) -> Self {
        if !candidates.is_empty() {
            let ssids: Vec<&str> = candidates.iter().map(|c| c.ssid.as_str()).collect();
            tracing::info!(?ssids, "WiFi candidates configured, association is left to the host");
        }
        Self {
            last_probe: None,
            local: None,
        }
    }

    fn probe() -> Option<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
        socket.connect(PROBE_TARGET).ok()?;
        let ip = socket.local_addr().ok()?.ip();
        (!ip.is_unspecified()).then_some(ip)
    }
}

impl WifiLink for RouteLink {
    fn poll_association(&mut self) -> bool {
        let due = self
            .last_probe
            .is_none_or(|last| last.elapsed() >= PROBE_INTERVAL);
        if due {
            self.last_probe = Some(Instant::now());
            self.local = Self::probe();
        }
        self.local.is_some()
    }

    fn local_address(&self) -> Option<IpAddr> {
        self.local
    }
}
