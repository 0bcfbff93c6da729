//! Endpoint host parsing and bounded resolution retries

use std::net::IpAddr;

use super::Resolver;
use crate::clock::Clock;

/// Suffix marking a multicast DNS name
const LOCAL_SUFFIX: &str = ".local";

/// Where the gateway lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointHost {
    /// Literal address, no resolution needed
    Address(IpAddr),
    /// mDNS host name, stored without the `.local` suffix
    Multicast(String),
    /// Name for the system resolver
    Dns(String),
}

impl EndpointHost {
    /// Classify a configured host string
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let host = raw.trim();
        let unbracketed = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = unbracketed.parse::<IpAddr>() {
            return Self::Address(ip);
        }

        let name = host.trim_end_matches('.').to_ascii_lowercase();
        match name.strip_suffix(LOCAL_SUFFIX) {
            Some(bare) if !bare.is_empty() => Self::Multicast(bare.to_string()),
            _ => Self::Dns(name),
        }
    }

    /// Literal address, if this host is one
    #[must_use]
    pub const fn address(&self) -> Option<IpAddr> {
        match self {
            Self::Address(ip) => Some(*ip),
            Self::Multicast(_) | Self::Dns(_) => None,
        }
    }

    /// Whether this host needs resolving
    #[must_use]
    pub const fn is_name(&self) -> bool {
        !matches!(self, Self::Address(_))
    }
}

impl std::fmt::Display for EndpointHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Address(ip) => write!(f, "{ip}"),
            Self::Multicast(bare) => write!(f, "{bare}{LOCAL_SUFFIX}"),
            Self::Dns(name) => write!(f, "{name}"),
        }
    }
}

/// Bounded retry with a fixed backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvePolicy {
    /// Total attempts, at least one
    pub attempts: u32,
    /// Delay between failed attempts
    pub backoff_ms: u64,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff_ms: 1000,
        }
    }
}

/// Resolve `host`, retrying per `policy`
///
/// Literal addresses return immediately. Blocks for up to
/// `(attempts - 1) * backoff_ms` plus resolver time; meant for startup.
pub fn resolve_with_retry(
    resolver: &mut dyn Resolver,
    host: &EndpointHost,
    policy: ResolvePolicy,
    clock: &dyn Clock,
) -> Option<IpAddr> {
    if let Some(ip) = host.address() {
        tracing::info!(address = %ip, "using direct address");
        return Some(ip);
    }

    tracing::info!(host = %host, "resolving gateway host");
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        if let Some(ip) = resolver.resolve(host) {
            tracing::info!(host = %host, address = %ip, attempt, "gateway host resolved");
            return Some(ip);
        }
        tracing::warn!(host = %host, attempt, attempts, "resolution attempt failed");
        if attempt < attempts {
            clock.delay_ms(policy.backoff_ms);
        }
    }

    tracing::error!(host = %host, attempts, "gateway host did not resolve");
    None
}
