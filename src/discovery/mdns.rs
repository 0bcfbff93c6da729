//! Gateway host resolution
//!
//! `.local` names go through an mDNS hostname query on a shared
//! [`ServiceDaemon`]. Other names use the system resolver. Blocking lookups
//! serve startup; [`Resolver::poll_resolve`] keeps one query in flight so the
//! loop never waits on the network.

use std::net::{IpAddr, ToSocketAddrs};
use std::sync::mpsc::{self, TryRecvError};
use std::time::{Duration, Instant};

use mdns_sd::{HostnameResolutionEvent, Receiver, ServiceDaemon};

use super::{EndpointHost, Lookup, Resolver};
use crate::{Error, Result};

/// A query started by [`Resolver::poll_resolve`]
enum InFlight {
    Multicast {
        host: EndpointHost,
        hostname: String,
        receiver: Receiver<HostnameResolutionEvent>,
        deadline: Instant,
    },
    Dns {
        host: EndpointHost,
        receiver: mpsc::Receiver<Option<IpAddr>>,
    },
}

impl InFlight {
    const fn host(&self) -> &EndpointHost {
        match self {
            Self::Multicast { host, .. } | Self::Dns { host, .. } => host,
        }
    }
}

/// Resolver backed by `mdns-sd` and the system DNS
pub struct MdnsResolver {
    daemon: ServiceDaemon,
    timeout_ms: u64,
    in_flight: Option<InFlight>,
}

impl MdnsResolver {
    /// Create a resolver with a per-query timeout
    ///
    /// # Errors
    ///
    /// Returns error if the mDNS daemon cannot be created
    pub fn new(timeout_ms: u64) -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| Error::Discovery(format!("failed to create mDNS daemon: {e}")))?;

        Ok(Self {
            daemon,
            timeout_ms,
            in_flight: None,
        })
    }

    fn start_multicast(&self, bare: &str) -> Option<(String, Receiver<HostnameResolutionEvent>)> {
        let hostname = format!("{bare}.local.");
        match self.daemon.resolve_hostname(&hostname, Some(self.timeout_ms)) {
            Ok(rx) => Some((hostname, rx)),
            Err(e) => {
                tracing::warn!(host = %hostname, error = %e, "mDNS query failed to start");
                None
            }
        }
    }

    fn stop_multicast(&self, hostname: &str) {
        if let Err(e) = self.daemon.stop_resolve_hostname(hostname) {
            tracing::trace!(error = %e, "stopping mDNS query");
        }
    }

    fn query_multicast(&self, bare: &str) -> Option<IpAddr> {
        let (hostname, receiver) = self.start_multicast(bare)?;

        let deadline = Instant::now() + Duration::from_millis(self.timeout_ms);
        let mut found = None;
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            match receiver.recv_timeout(remaining) {
                Ok(HostnameResolutionEvent::AddressesFound(_, addrs)) => {
                    found = prefer_ipv4(addrs.iter().copied());
                    if found.is_some() {
                        break;
                    }
                }
                Ok(
                    HostnameResolutionEvent::SearchTimeout(_)
                    | HostnameResolutionEvent::SearchStopped(_),
                )
                | Err(_) => break,
                Ok(other) => tracing::trace!(event = ?other, "mDNS event"),
            }
        }

        self.stop_multicast(&hostname);
        found
    }

    fn query_dns(name: &str) -> Option<IpAddr> {
        match (name, 0).to_socket_addrs() {
            Ok(addrs) => prefer_ipv4(addrs.map(|a| a.ip())),
            Err(e) => {
                tracing::debug!(host = %name, error = %e, "DNS lookup failed");
                None
            }
        }
    }

    fn start_query(&self, host: &EndpointHost) -> Option<InFlight> {
        match host {
            EndpointHost::Address(_) => None,
            EndpointHost::Multicast(bare) => {
                let (hostname, receiver) = self.start_multicast(bare)?;
                Some(InFlight::Multicast {
                    host: host.clone(),
                    hostname,
                    receiver,
                    deadline: Instant::now() + Duration::from_millis(self.timeout_ms),
                })
            }
            EndpointHost::Dns(name) => {
                let (tx, receiver) = mpsc::channel();
                let name = name.clone();
                std::thread::spawn(move || {
                    // Receiver may be gone if the query was abandoned
                    let _ = tx.send(Self::query_dns(&name));
                });
                Some(InFlight::Dns {
                    host: host.clone(),
                    receiver,
                })
            }
        }
    }

    /// Check an in-flight query without waiting
    fn check(&self, query: &InFlight) -> Lookup {
        match query {
            InFlight::Multicast {
                hostname,
                receiver,
                deadline,
                ..
            } => {
                while let Ok(event) = receiver.try_recv() {
                    match event {
                        HostnameResolutionEvent::AddressesFound(_, addrs) => {
                            if let Some(ip) = prefer_ipv4(addrs.iter().copied()) {
                                self.stop_multicast(hostname);
                                return Lookup::Found(ip);
                            }
                        }
                        HostnameResolutionEvent::SearchTimeout(_)
                        | HostnameResolutionEvent::SearchStopped(_) => return Lookup::Failed,
                        other => tracing::trace!(event = ?other, "mDNS event"),
                    }
                }
                if Instant::now() >= *deadline || receiver.is_disconnected() {
                    self.stop_multicast(hostname);
                    Lookup::Failed
                } else {
                    Lookup::Pending
                }
            }
            InFlight::Dns { receiver, .. } => match receiver.try_recv() {
                Ok(answer) => answer.into(),
                Err(TryRecvError::Empty) => Lookup::Pending,
                Err(TryRecvError::Disconnected) => Lookup::Failed,
            },
        }
    }
}

/// First IPv4 address, else the first of any family
fn prefer_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    // The gateway listens on IPv4 by default
    let mut first = None;
    for ip in addrs {
        if ip.is_ipv4() {
            return Some(ip);
        }
        first.get_or_insert(ip);
    }
    first
}

impl Resolver for MdnsResolver {
    fn resolve(&mut self, host: &EndpointHost) -> Option<IpAddr> {
        match host {
            EndpointHost::Address(ip) => Some(*ip),
            EndpointHost::Multicast(bare) => self.query_multicast(bare),
            EndpointHost::Dns(name) => Self::query_dns(name),
        }
    }

    fn poll_resolve(&mut self, host: &EndpointHost) -> Lookup {
        if let Some(ip) = host.address() {
            return Lookup::Found(ip);
        }

        let query = match self.in_flight.take() {
            Some(query) if query.host() == host => query,
            stale => {
                if let Some(InFlight::Multicast { hostname, .. }) = &stale {
                    self.stop_multicast(hostname);
                }
                match self.start_query(host) {
                    Some(query) => query,
                    None => return Lookup::Failed,
                }
            }
        };

        let progress = self.check(&query);
        if progress == Lookup::Pending {
            self.in_flight = Some(query);
        }
        progress
    }
}

impl Drop for MdnsResolver {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.shutdown() {
            tracing::trace!(error = %e, "mDNS daemon shutdown error (expected on normal exit)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_address_resolves_without_network() {
        // Daemon creation may fail in sandboxed CI; that's OK
        if let Ok(mut resolver) = MdnsResolver::new(100) {
            let ip: IpAddr = "10.0.0.2".parse().unwrap();
            assert_eq!(resolver.resolve(&EndpointHost::Address(ip)), Some(ip));
        }
    }

    #[test]
    fn dns_resolves_localhost() {
        let ip = MdnsResolver::query_dns("localhost");
        assert!(ip.is_some_and(|ip| ip.is_loopback()));
    }

    #[test]
    fn polled_dns_lookup_finishes_in_background() {
        let Ok(mut resolver) = MdnsResolver::new(100) else {
            return;
        };
        let host = EndpointHost::Dns("localhost".to_string());

        let deadline = Instant::now() + Duration::from_secs(5);
        let progress = loop {
            let progress = resolver.poll_resolve(&host);
            if progress != Lookup::Pending || Instant::now() >= deadline {
                break progress;
            }
            std::thread::sleep(Duration::from_millis(5));
        };

        assert!(matches!(progress, Lookup::Found(ip) if ip.is_loopback()));
        assert!(resolver.in_flight.is_none());
    }

    #[test]
    fn prefers_ipv4() {
        let v6: IpAddr = "fe80::1".parse().unwrap();
        let v4: IpAddr = "10.0.0.9".parse().unwrap();
        assert_eq!(prefer_ipv4([v6, v4]), Some(v4));
        assert_eq!(prefer_ipv4([v6]), Some(v6));
        assert_eq!(prefer_ipv4(Vec::new()), None);
    }
}
