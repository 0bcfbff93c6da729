//! Gateway connectivity
//!
//! Keeps a WebSocket session to the speech gateway alive across WiFi drops,
//! resolution failures and gateway address changes. Everything here is
//! driven from the loop tick; the transport does its I/O elsewhere and hands
//! back events through [`Transport::poll`].

mod link;
mod manager;
pub mod messages;
mod ws;

use std::net::IpAddr;

pub use link::RouteLink;
pub use manager::ConnectivityManager;
pub use messages::{ClientMessage, CommandAction, ServerMessage, parse_server_message};
pub use ws::WsTransport;

use crate::hooks::HookNotification;

/// Event raised by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed
    Connected,
    /// Connection closed by the peer or failed to open
    Disconnected,
    /// Inbound text frame
    Text(String),
    /// Inbound binary frame
    Binary(Vec<u8>),
}

/// Message transport to the gateway
pub trait Transport {
    /// Start connecting to `url`, replacing any current connection
    fn open(&mut self, url: &str);

    /// Tear down the connection; no further events are reported for it
    fn close(&mut self);

    /// Queue a text frame; `false` if there is no connection to queue on
    fn send_text(&mut self, text: &str) -> bool;

    /// Queue a binary frame; `false` if there is no connection to queue on
    fn send_binary(&mut self, data: &[u8]) -> bool;

    /// Next pending event, never blocks
    fn poll(&mut self) -> Option<TransportEvent>;
}

/// Network link (WiFi on the device)
pub trait WifiLink {
    /// Drive association and report whether the link is up
    fn poll_association(&mut self) -> bool;

    /// Address assigned to this end of the link
    fn local_address(&self) -> Option<IpAddr>;
}

/// Connectivity snapshot, written only by [`ConnectivityManager`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub wifi_connected: bool,
    pub endpoint_resolved: bool,
    pub resolved_address: Option<IpAddr>,
    /// Implies `endpoint_resolved`
    pub ws_connected: bool,
    pub last_resolve_ms: u64,
}

/// What the loop needs to react to after a connectivity tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    Connected,
    Disconnected,
    Hook(HookNotification),
}
