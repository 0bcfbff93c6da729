//! Gateway endpoint discovery
//!
//! The gateway is configured either as a literal address or as a name.
//! `.local` names are resolved over mDNS, anything else through the system
//! resolver. Literal addresses never touch the network.

mod endpoint;
pub mod mdns;

use std::net::IpAddr;

pub use endpoint::{EndpointHost, ResolvePolicy, resolve_with_retry};
pub use mdns::MdnsResolver;

/// Progress of a polled lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Query still running, poll again later
    Pending,
    Found(IpAddr),
    Failed,
}

impl From<Option<IpAddr>> for Lookup {
    fn from(answer: Option<IpAddr>) -> Self {
        answer.map_or(Self::Failed, Self::Found)
    }
}

/// Name-resolution capability
pub trait Resolver {
    /// One lookup attempt; `None` when the name did not resolve
    ///
    /// May block for a bounded, implementation-defined timeout.
    fn resolve(&mut self, host: &EndpointHost) -> Option<IpAddr>;

    /// Non-blocking lookup
    ///
    /// The first call starts a query; later calls for the same host report
    /// its progress until it finishes. Resolvers without a background query
    /// answer synchronously.
    fn poll_resolve(&mut self, host: &EndpointHost) -> Lookup {
        self.resolve(host).into()
    }
}
