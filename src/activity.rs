//! The main loop
//!
//! One tick runs, in order: button edges, the session capture pump, the
//! connectivity pump, feedback playback (idle only), then the keep-alive and
//! auto-shutdown timers. A button edge seen in a tick is therefore acted on
//! before any beep plays in that same tick.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::buttons::{Button, ButtonEdges, ButtonPanel, Edge};
use crate::clock::Clock;
use crate::config::Config;
use crate::connectivity::{ConnectionState, ConnectivityManager, NetEvent};
use crate::feedback::FeedbackQueue;
use crate::hooks::{CONNECTED_EVENT, HookEventRouter, HookNotification};
use crate::power::{KeepAlive, PowerControl};
use crate::session::{CaptureOutcome, SessionController};
use crate::voice::{AudioInput, AudioOutput};
use crate::Result;

/// Hardware the loop drives
pub struct Peripherals {
    pub mic: Box<dyn AudioInput>,
    pub speaker: Box<dyn AudioOutput>,
    pub buttons: Box<dyn ButtonPanel>,
    pub power: Box<dyn PowerControl>,
    pub clock: Box<dyn Clock>,
}

/// Whether the loop should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    PowerOff,
}

/// Owns every state machine and runs them in a fixed order each tick
pub struct ActivityLoop {
    io: Peripherals,
    net: ConnectivityManager,
    session: SessionController,
    feedback: FeedbackQueue,
    router: HookEventRouter,
    edges: ButtonEdges,
    keepalive: KeepAlive,
    auto_shutdown_ms: Option<u64>,
}

impl ActivityLoop {
    #[must_use]
    pub fn new(config: &Config, io: Peripherals, net: ConnectivityManager) -> Self {
        Self {
            io,
            net,
            session: SessionController::new(config.device_id.clone(), config.timing.max_record_ms),
            feedback: FeedbackQueue::new(config.volume),
            router: HookEventRouter::new(),
            edges: ButtonEdges::new(config.timing.debounce_ms),
            keepalive: KeepAlive::new(&config.timing),
            auto_shutdown_ms: config.timing.auto_shutdown_ms,
        }
    }

    /// Open the microphone and bring the network up
    ///
    /// Blocks until the link associates and the first resolution finishes.
    ///
    /// # Errors
    ///
    /// Returns error if the microphone cannot be opened
    pub fn begin(&mut self) -> Result<()> {
        self.io.mic.begin()?;
        self.net.begin(self.io.clock.as_ref());
        self.keepalive.touch(self.io.clock.now_ms());
        Ok(())
    }

    /// Run one loop iteration
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.io.clock.now_ms();

        self.handle_buttons(now);
        self.pump_session(now);
        self.pump_network(now);

        if !self.session.is_recording() && self.feedback.has_pending() {
            self.feedback.drain_and_play(
                self.io.mic.as_mut(),
                self.io.speaker.as_mut(),
                self.io.clock.as_ref(),
            );
        }

        // Playback may have blocked for a while
        let now = self.io.clock.now_ms();
        self.keepalive.tick(now, self.io.power.as_mut());

        if let Some(limit) = self.auto_shutdown_ms
            && !self.session.is_recording()
            && self.keepalive.idle_ms(now) > limit
        {
            tracing::info!(idle_ms = self.keepalive.idle_ms(now), "idle, shutting down");
            self.shutdown();
            self.io.power.power_off();
            return TickOutcome::PowerOff;
        }

        TickOutcome::Continue
    }

    /// Tick until `stop` is set or the device powers off
    pub fn run(&mut self, stop: &AtomicBool) {
        while !stop.load(Ordering::Relaxed) {
            if self.tick() == TickOutcome::PowerOff {
                return;
            }
            self.io.clock.delay_ms(1);
        }
        self.shutdown();
    }

    /// End any session and close the gateway connection
    pub fn shutdown(&mut self) {
        if let Some(id) = self.session.stop() {
            self.net.send_end(&id);
        }
        self.net.close();
        self.io.mic.end();
    }

    #[must_use]
    pub const fn session(&self) -> &SessionController {
        &self.session
    }

    #[must_use]
    pub const fn feedback(&self) -> &FeedbackQueue {
        &self.feedback
    }

    #[must_use]
    pub const fn connection(&self) -> &ConnectionState {
        self.net.state()
    }

    fn handle_buttons(&mut self, now: u64) {
        for (button, edge) in self.edges.poll(self.io.buttons.as_mut(), now) {
            self.keepalive.touch(now);
            match (button, edge) {
                (Button::Talk, Edge::Pressed) => self.start_session(now),
                (Button::Talk, Edge::Released) => {
                    if let Some(id) = self.session.stop() {
                        self.net.send_end(&id);
                    }
                }
                (aux, Edge::Pressed) => {
                    let Some(action) = aux.command() else {
                        continue;
                    };
                    if self.net.is_connected() {
                        self.net.send_command(action);
                    } else {
                        tracing::warn!(button = %aux, "button pressed but gateway not connected");
                    }
                }
                (_, Edge::Released) => {}
            }
        }
    }

    fn start_session(&mut self, now: u64) {
        if self.session.is_recording() {
            return;
        }
        if !self.net.is_connected() {
            tracing::warn!("talk pressed but gateway not connected");
            return;
        }
        if let Some(id) = self.session.start(now, true, &mut self.feedback) {
            self.net.send_start(&id);
        }
    }

    fn pump_session(&mut self, now: u64) {
        if !self.session.is_recording() {
            return;
        }
        self.keepalive.touch(now);
        if let CaptureOutcome::TimedOut(id) =
            self.session
                .capture_and_send_tick(now, self.io.mic.as_mut(), &mut self.net)
        {
            self.net.send_end(&id);
        }
    }

    fn pump_network(&mut self, now: u64) {
        for event in self.net.tick(now, self.session.is_recording()) {
            match event {
                NetEvent::Connected => {
                    self.keepalive.touch(now);
                    let connected = HookNotification::new("", CONNECTED_EVENT);
                    self.router.handle(&connected, &mut self.feedback);
                }
                NetEvent::Disconnected => {}
                NetEvent::Hook(hook) => {
                    self.keepalive.touch(now);
                    self.router.handle(&hook, &mut self.feedback);
                }
            }
        }
    }
}
