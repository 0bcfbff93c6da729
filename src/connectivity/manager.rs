//! Connection lifecycle: link, resolution, session and inbound dispatch

use std::net::IpAddr;

use super::messages::{ClientMessage, CommandAction, ServerMessage, parse_server_message};
use super::{ConnectionState, NetEvent, Transport, TransportEvent, WifiLink};
use crate::clock::Clock;
use crate::config::{Config, ServerConfig, TimingConfig};
use crate::discovery::{EndpointHost, Lookup, ResolvePolicy, Resolver, resolve_with_retry};
use crate::session::FrameSink;
use crate::voice::{BIT_DEPTH, CHANNELS, FORMAT, SAMPLE_RATE};

/// Owns the gateway connection and everything needed to keep it up
pub struct ConnectivityManager {
    host: EndpointHost,
    server: ServerConfig,
    timing: TimingConfig,
    link: Box<dyn WifiLink>,
    resolver: Box<dyn Resolver>,
    transport: Box<dyn Transport>,
    state: ConnectionState,
    /// A transport connection is open or opening
    session_open: bool,
    last_closed_ms: Option<u64>,
    last_resolve_attempt_ms: Option<u64>,
    /// A polled lookup is still running
    lookup_in_flight: bool,
}

impl ConnectivityManager {
    #[must_use]
    pub fn new(
        config: &Config,
        link: Box<dyn WifiLink>,
        resolver: Box<dyn Resolver>,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            host: EndpointHost::parse(&config.server.host),
            server: config.server.clone(),
            timing: config.timing,
            link,
            resolver,
            transport,
            state: ConnectionState::default(),
            session_open: false,
            last_closed_ms: None,
            last_resolve_attempt_ms: None,
            lookup_in_flight: false,
        }
    }

    /// Bring the link up, resolve the gateway and open the session
    ///
    /// Blocks until the link associates, then for the bounded resolution
    /// retries. An unresolved gateway is retried later from [`Self::tick`].
    pub fn begin(&mut self, clock: &dyn Clock) {
        let mut waiting_logged = false;
        while !self.link.poll_association() {
            if !waiting_logged {
                tracing::info!("waiting for network link");
                waiting_logged = true;
            }
            clock.delay_ms(self.timing.wifi_poll_ms);
        }
        self.state.wifi_connected = true;
        match self.link.local_address() {
            Some(ip) => tracing::info!(local_address = %ip, "network link up"),
            None => tracing::info!("network link up"),
        }

        let policy = ResolvePolicy {
            attempts: self.timing.resolve_attempts,
            backoff_ms: self.timing.resolve_backoff_ms,
        };
        let resolved = resolve_with_retry(self.resolver.as_mut(), &self.host, policy, clock);
        let now = clock.now_ms();
        self.last_resolve_attempt_ms = Some(now);

        match resolved {
            Some(ip) => {
                self.set_resolved(ip, now);
                self.open_session();
            }
            None => tracing::warn!(host = %self.host, "gateway unresolved, will keep retrying"),
        }
    }

    /// Advance connectivity by one loop iteration
    ///
    /// Never waits on the network: lookups run in the background and are
    /// polled here. Re-resolution of a named gateway is deferred while
    /// `recording` so an address change never tears down a live dictation.
    pub fn tick(&mut self, now_ms: u64, recording: bool) -> Vec<NetEvent> {
        let mut events = Vec::new();

        let link_up = self.link.poll_association();
        if link_up != self.state.wifi_connected {
            if link_up {
                tracing::info!("network link restored");
            } else {
                tracing::warn!("network link lost");
            }
            self.state.wifi_connected = link_up;
        }

        if link_up {
            if !self.state.endpoint_resolved {
                self.retry_resolution(now_ms);
            } else if (self.lookup_in_flight && !recording) || self.recheck_due(now_ms, recording) {
                self.recheck_address(now_ms, &mut events);
            }

            if self.state.endpoint_resolved && !self.session_open && self.reconnect_due(now_ms) {
                tracing::info!("reconnecting to gateway");
                self.open_session();
            }
        }

        while let Some(event) = self.transport.poll() {
            self.dispatch(event, now_ms, &mut events);
        }

        events
    }

    /// Transport-level connected flag
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.state.ws_connected
    }

    #[must_use]
    pub const fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Configured gateway host
    #[must_use]
    pub const fn endpoint(&self) -> &EndpointHost {
        &self.host
    }

    /// Announce a new dictation session
    pub fn send_start(&mut self, req_id: &str) -> bool {
        let token = self.server.token.clone();
        let mode = self.server.mode.clone();
        self.send_message(&ClientMessage::Start {
            token: &token,
            req_id,
            mode: &mode,
            format: FORMAT,
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            bit_depth: BIT_DEPTH,
        })
    }

    /// Close a dictation session
    pub fn send_end(&mut self, req_id: &str) -> bool {
        self.send_message(&ClientMessage::End { req_id })
    }

    /// Relay an operator command
    pub fn send_command(&mut self, action: CommandAction) -> bool {
        let sent = self.send_message(&ClientMessage::Command { action });
        if sent {
            tracing::info!(action = %action, "command sent");
        }
        sent
    }

    /// Send one binary audio frame
    pub fn send_audio(&mut self, pcm: &[u8]) -> bool {
        if !self.state.ws_connected {
            tracing::trace!("audio frame dropped, not connected");
            return false;
        }
        self.transport.send_binary(pcm)
    }

    /// Close the gateway session
    pub fn close(&mut self) {
        if self.session_open {
            self.transport.close();
            tracing::info!("gateway session closed");
        }
        self.session_open = false;
        self.state.ws_connected = false;
    }

    fn send_message(&mut self, message: &ClientMessage<'_>) -> bool {
        if !self.state.ws_connected {
            tracing::debug!(message = ?message, "message dropped, not connected");
            return false;
        }
        match message.to_json() {
            Ok(json) => self.transport.send_text(&json),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode message");
                false
            }
        }
    }

    fn set_resolved(&mut self, ip: IpAddr, now_ms: u64) {
        self.state.endpoint_resolved = true;
        self.state.resolved_address = Some(ip);
        self.state.last_resolve_ms = now_ms;
    }

    fn open_session(&mut self) {
        let Some(ip) = self.state.resolved_address else {
            return;
        };
        let url = self.server.ws_url(ip);
        tracing::info!(url = %url, "opening gateway session");
        self.transport.open(&url);
        self.session_open = true;
    }

    fn retry_resolution(&mut self, now_ms: u64) {
        if !self.lookup_in_flight {
            let due = self
                .last_resolve_attempt_ms
                .is_none_or(|last| now_ms.saturating_sub(last) >= self.timing.resolve_backoff_ms);
            if !due {
                return;
            }
            self.last_resolve_attempt_ms = Some(now_ms);
        }

        match self.poll_lookup() {
            Lookup::Pending => {}
            Lookup::Found(ip) => {
                tracing::info!(host = %self.host, address = %ip, "gateway host resolved");
                self.set_resolved(ip, now_ms);
                self.open_session();
            }
            Lookup::Failed => tracing::debug!(host = %self.host, "gateway host still unresolved"),
        }
    }

    fn recheck_due(&self, now_ms: u64, recording: bool) -> bool {
        self.host.is_name()
            && !recording
            && now_ms.saturating_sub(self.state.last_resolve_ms) >= self.timing.recheck_interval_ms
    }

    fn recheck_address(&mut self, now_ms: u64, events: &mut Vec<NetEvent>) {
        if !self.lookup_in_flight {
            self.state.last_resolve_ms = now_ms;
        }
        let ip = match self.poll_lookup() {
            Lookup::Pending => return,
            Lookup::Found(ip) => ip,
            Lookup::Failed => {
                tracing::warn!(host = %self.host, "re-resolution failed, keeping current address");
                return;
            }
        };
        if self.state.resolved_address == Some(ip) {
            tracing::debug!(address = %ip, "gateway address unchanged");
            return;
        }

        tracing::info!(
            old = ?self.state.resolved_address,
            new = %ip,
            "gateway address changed, reconnecting"
        );
        let was_connected = self.state.ws_connected;
        self.close();
        if was_connected {
            events.push(NetEvent::Disconnected);
        }
        self.set_resolved(ip, now_ms);
        self.open_session();
    }

    fn poll_lookup(&mut self) -> Lookup {
        let progress = match self.host.address() {
            Some(ip) => Lookup::Found(ip),
            None => self.resolver.poll_resolve(&self.host),
        };
        self.lookup_in_flight = progress == Lookup::Pending;
        progress
    }

    fn reconnect_due(&self, now_ms: u64) -> bool {
        self.last_closed_ms
            .is_none_or(|closed| now_ms.saturating_sub(closed) >= self.timing.reconnect_interval_ms)
    }

    fn dispatch(&mut self, event: TransportEvent, now_ms: u64, events: &mut Vec<NetEvent>) {
        match event {
            TransportEvent::Connected => {
                if !self.session_open || self.state.ws_connected {
                    return;
                }
                self.state.ws_connected = true;
                tracing::info!(address = ?self.state.resolved_address, "gateway connected");
                events.push(NetEvent::Connected);
            }
            TransportEvent::Disconnected => {
                if !self.session_open {
                    return;
                }
                self.session_open = false;
                self.last_closed_ms = Some(now_ms);
                if self.state.ws_connected {
                    self.state.ws_connected = false;
                    tracing::warn!("gateway disconnected");
                    events.push(NetEvent::Disconnected);
                } else {
                    tracing::warn!("gateway connection failed");
                }
            }
            TransportEvent::Text(text) => match parse_server_message(&text) {
                Ok(ServerMessage::Hook(hook)) => events.push(NetEvent::Hook(hook)),
                Ok(ServerMessage::Ack { req_id }) => {
                    tracing::info!(req_id = %req_id, "session acknowledged");
                }
                Ok(ServerMessage::Result { req_id, text }) => {
                    tracing::info!(req_id = %req_id, text = %text, "transcript received");
                }
                Ok(ServerMessage::Other(kind)) => {
                    tracing::debug!(kind = %kind, "unhandled server message");
                }
                Err(e) => tracing::warn!(error = %e, "malformed server message discarded"),
            },
            TransportEvent::Binary(data) => {
                tracing::debug!(bytes = data.len(), "unexpected binary frame ignored");
            }
        }
    }
}

impl FrameSink for ConnectivityManager {
    fn send_audio(&mut self, pcm: &[u8]) -> bool {
        Self::send_audio(self, pcm)
    }
}
