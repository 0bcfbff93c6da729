//! Shared test utilities
//!
//! In-memory stand-ins for every capability the loop drives. Each fake keeps
//! its state behind an `Rc<RefCell<_>>` so a test can script and inspect it
//! after handing the fake itself to the code under test.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::rc::Rc;

use beacon_ptt::buttons::{Button, ButtonPanel};
use beacon_ptt::clock::Clock;
use beacon_ptt::config::file::PttConfigFile;
use beacon_ptt::connectivity::{Transport, TransportEvent, WifiLink};
use beacon_ptt::discovery::{EndpointHost, Lookup, Resolver};
use beacon_ptt::power::PowerControl;
use beacon_ptt::voice::{AudioInput, AudioOutput};
use beacon_ptt::{ActivityLoop, Config, ConnectivityManager, Peripherals};

/// Simulated millisecond clock; delays advance it instantly
#[derive(Clone, Default)]
pub struct FakeClock(Rc<Cell<u64>>);

impl FakeClock {
    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }

    pub fn set(&self, ms: u64) {
        self.0.set(ms);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }

    fn delay_ms(&self, ms: u64) {
        self.advance(ms);
    }
}

#[derive(Default)]
pub struct MicState {
    pub enabled: bool,
    pub ready: bool,
    pub fill: i16,
    pub begins: u32,
    pub ends: u32,
}

pub struct FakeMic(pub Rc<RefCell<MicState>>);

impl AudioInput for FakeMic {
    fn begin(&mut self) -> beacon_ptt::Result<()> {
        let mut mic = self.0.borrow_mut();
        mic.enabled = true;
        mic.begins += 1;
        Ok(())
    }

    fn end(&mut self) {
        let mut mic = self.0.borrow_mut();
        mic.enabled = false;
        mic.ends += 1;
    }

    fn is_enabled(&self) -> bool {
        self.0.borrow().enabled
    }

    fn try_record(&mut self, buf: &mut [i16]) -> bool {
        let mic = self.0.borrow();
        if !(mic.enabled && mic.ready) {
            return false;
        }
        buf.fill(mic.fill);
        true
    }
}

#[derive(Default)]
pub struct SpeakerState {
    pub active: bool,
    pub volume: u8,
    /// (frequency, duration) of every tone, in order
    pub tones: Vec<(u16, u16)>,
    /// Tones requested while the microphone was still capturing
    pub tones_over_mic: u32,
}

pub struct FakeSpeaker {
    pub state: Rc<RefCell<SpeakerState>>,
    pub mic: Rc<RefCell<MicState>>,
}

impl AudioOutput for FakeSpeaker {
    fn begin(&mut self) -> beacon_ptt::Result<()> {
        self.state.borrow_mut().active = true;
        Ok(())
    }

    fn end(&mut self) {
        self.state.borrow_mut().active = false;
    }

    fn set_volume(&mut self, volume: u8) {
        self.state.borrow_mut().volume = volume;
    }

    fn tone(&mut self, freq_hz: u16, duration_ms: u16) {
        let mut state = self.state.borrow_mut();
        if self.mic.borrow().enabled {
            state.tones_over_mic += 1;
        }
        state.tones.push((freq_hz, duration_ms));
    }
}

pub struct FakePanel(pub Rc<RefCell<HashSet<Button>>>);

impl ButtonPanel for FakePanel {
    fn is_pressed(&mut self, button: Button) -> bool {
        self.0.borrow().contains(&button)
    }
}

#[derive(Default)]
pub struct LinkState {
    pub up: bool,
    /// Polls that still report down before `up` applies
    pub down_polls: u32,
    pub polls: u32,
}

pub struct FakeLink(pub Rc<RefCell<LinkState>>);

impl WifiLink for FakeLink {
    fn poll_association(&mut self) -> bool {
        let mut link = self.0.borrow_mut();
        link.polls += 1;
        if link.down_polls > 0 {
            link.down_polls -= 1;
            return false;
        }
        link.up
    }

    fn local_address(&self) -> Option<IpAddr> {
        self.0.borrow().up.then(|| "10.0.0.77".parse().unwrap())
    }
}

#[derive(Default)]
pub struct ResolverState {
    /// Scripted answers, consumed first
    pub answers: VecDeque<Option<IpAddr>>,
    /// Answer once the script runs out
    pub fallback: Option<IpAddr>,
    pub calls: u32,
    /// Polled lookups that report `Pending` before answering
    pub pending_polls: u32,
    pub polls: u32,
}

pub struct FakeResolver(pub Rc<RefCell<ResolverState>>);

impl Resolver for FakeResolver {
    fn resolve(&mut self, _host: &EndpointHost) -> Option<IpAddr> {
        let mut state = self.0.borrow_mut();
        state.calls += 1;
        let fallback = state.fallback;
        state.answers.pop_front().unwrap_or(fallback)
    }

    fn poll_resolve(&mut self, host: &EndpointHost) -> Lookup {
        {
            let mut state = self.0.borrow_mut();
            state.polls += 1;
            if state.pending_polls > 0 {
                state.pending_polls -= 1;
                return Lookup::Pending;
            }
        }
        self.resolve(host).into()
    }
}

#[derive(Default)]
pub struct TransportState {
    /// Report `Connected` right after every open
    pub auto_connect: bool,
    pub opened: Vec<String>,
    pub closes: u32,
    pub texts: Vec<String>,
    pub binaries: Vec<Vec<u8>>,
    pub inbound: VecDeque<TransportEvent>,
}

pub struct FakeTransport(pub Rc<RefCell<TransportState>>);

impl Transport for FakeTransport {
    fn open(&mut self, url: &str) {
        let mut t = self.0.borrow_mut();
        t.opened.push(url.to_string());
        t.inbound.clear();
        if t.auto_connect {
            t.inbound.push_back(TransportEvent::Connected);
        }
    }

    fn close(&mut self) {
        let mut t = self.0.borrow_mut();
        t.closes += 1;
        t.inbound.clear();
    }

    fn send_text(&mut self, text: &str) -> bool {
        self.0.borrow_mut().texts.push(text.to_string());
        true
    }

    fn send_binary(&mut self, data: &[u8]) -> bool {
        self.0.borrow_mut().binaries.push(data.to_vec());
        true
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        self.0.borrow_mut().inbound.pop_front()
    }
}

#[derive(Default)]
pub struct PowerState {
    pub keepalive: Vec<bool>,
    pub powered_off: bool,
}

pub struct FakePower(pub Rc<RefCell<PowerState>>);

impl PowerControl for FakePower {
    fn set_keepalive(&mut self, high: bool) {
        self.0.borrow_mut().keepalive.push(high);
    }

    fn power_off(&mut self) {
        self.0.borrow_mut().powered_off = true;
    }
}

/// Gateway address the fake resolver hands out by default
pub const GATEWAY_IP: &str = "10.0.0.5";

/// One set of fakes plus handles to their state
pub struct Rig {
    pub clock: FakeClock,
    pub mic: Rc<RefCell<MicState>>,
    pub speaker: Rc<RefCell<SpeakerState>>,
    pub panel: Rc<RefCell<HashSet<Button>>>,
    pub link: Rc<RefCell<LinkState>>,
    pub resolver: Rc<RefCell<ResolverState>>,
    pub transport: Rc<RefCell<TransportState>>,
    pub power: Rc<RefCell<PowerState>>,
}

impl Rig {
    /// Link up, resolver answering, transport connecting, mic always ready
    pub fn new() -> Self {
        let rig = Self {
            clock: FakeClock::default(),
            mic: Rc::default(),
            speaker: Rc::default(),
            panel: Rc::default(),
            link: Rc::default(),
            resolver: Rc::default(),
            transport: Rc::default(),
            power: Rc::default(),
        };
        rig.link.borrow_mut().up = true;
        rig.resolver.borrow_mut().fallback = Some(ip(GATEWAY_IP));
        rig.transport.borrow_mut().auto_connect = true;
        rig.mic.borrow_mut().ready = true;
        rig
    }

    /// Default configuration pointed at `host`
    pub fn config(host: &str) -> Config {
        let mut config = Config::from_sources(PttConfigFile::default(), |key| match key {
            "BEACON_PTT_DEVICE_ID" => Some("ab12".to_string()),
            "BEACON_PTT_TOKEN" => Some("secret".to_string()),
            _ => None,
        })
        .unwrap();
        config.server.host = host.to_string();
        config
    }

    pub fn connectivity(&self, config: &Config) -> ConnectivityManager {
        ConnectivityManager::new(
            config,
            Box::new(FakeLink(Rc::clone(&self.link))),
            Box::new(FakeResolver(Rc::clone(&self.resolver))),
            Box::new(FakeTransport(Rc::clone(&self.transport))),
        )
    }

    pub fn activity(&self, config: &Config) -> ActivityLoop {
        let io = Peripherals {
            mic: Box::new(FakeMic(Rc::clone(&self.mic))),
            speaker: Box::new(FakeSpeaker {
                state: Rc::clone(&self.speaker),
                mic: Rc::clone(&self.mic),
            }),
            buttons: Box::new(FakePanel(Rc::clone(&self.panel))),
            power: Box::new(FakePower(Rc::clone(&self.power))),
            clock: Box::new(self.clock.clone()),
        };
        ActivityLoop::new(config, io, self.connectivity(config))
    }

    pub fn press(&self, button: Button) {
        self.panel.borrow_mut().insert(button);
    }

    pub fn release(&self, button: Button) {
        self.panel.borrow_mut().remove(&button);
    }

    /// Queue an inbound text frame
    pub fn push_text(&self, text: &str) {
        self.transport
            .borrow_mut()
            .inbound
            .push_back(TransportEvent::Text(text.to_string()));
    }

    pub fn push_hook(&self, id: &str, event: &str) {
        self.push_text(&format!(
            r#"{{"type":"hook","id":"{id}","hook_event_name":"{event}"}}"#
        ));
    }

    /// Sent text messages of one `type`, decoded
    pub fn sent(&self, kind: &str) -> Vec<serde_json::Value> {
        self.transport
            .borrow()
            .texts
            .iter()
            .map(|t| serde_json::from_str::<serde_json::Value>(t).unwrap())
            .filter(|v| v["type"] == kind)
            .collect()
    }

    /// Number of tones played at `freq_hz`
    pub fn tones_at(&self, freq_hz: u16) -> usize {
        self.speaker
            .borrow()
            .tones
            .iter()
            .filter(|(f, _)| *f == freq_hz)
            .count()
    }
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}
