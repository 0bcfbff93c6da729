//! Recording session state machine
//!
//! One session at a time. A session starts on a button press, streams one
//! fixed-size audio chunk per tick, and ends on release or when it hits the
//! recording ceiling. The controller never emits protocol messages itself
//! except the audio frames; start and end messages are the caller's job.

use crate::feedback::FeedbackQueue;
use crate::voice::{AudioInput, CHUNK_BYTES, CHUNK_SAMPLES, encode_pcm_le};

/// Recording state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
}

/// Destination for captured audio frames
pub trait FrameSink {
    /// Send one binary audio frame; returns whether it was handed to the wire
    fn send_audio(&mut self, pcm: &[u8]) -> bool;
}

/// What one capture tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// No session is recording
    Idle,
    /// The microphone had no full chunk ready
    NotReady,
    /// One chunk was captured and handed to the sink
    Sent,
    /// One chunk was captured but the sink dropped it
    Dropped,
    /// The session hit the recording ceiling and is now idle
    TimedOut(String),
}

/// The single process-wide session
#[derive(Debug, Clone, Default)]
struct Session {
    id: String,
    active: bool,
    started_at_ms: u64,
    chunks_sent: u32,
    chunks_dropped: u32,
}

/// Owns the recording lifecycle and the per-tick capture pump
#[derive(Debug)]
pub struct SessionController {
    device_id: String,
    max_record_ms: u64,
    session: Session,
    last_id_ms: Option<u64>,
    samples: [i16; CHUNK_SAMPLES],
    frame: Vec<u8>,
}

impl SessionController {
    /// Create an idle controller
    #[must_use]
    pub fn new(device_id: impl Into<String>, max_record_ms: u64) -> Self {
        Self {
            device_id: device_id.into(),
            max_record_ms,
            session: Session::default(),
            last_id_ms: None,
            samples: [0; CHUNK_SAMPLES],
            frame: Vec::with_capacity(CHUNK_BYTES),
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        if self.session.active {
            SessionState::Recording
        } else {
            SessionState::Idle
        }
    }

    /// Whether a session is recording
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.session.active
    }

    /// Id of the active session
    #[must_use]
    pub fn active_id(&self) -> Option<&str> {
        self.session.active.then_some(self.session.id.as_str())
    }

    /// Start a session
    ///
    /// Only valid from idle and only with the gateway connected; otherwise a
    /// warning is logged and nothing changes. Clears all pending feedback so
    /// stale beeps from an earlier session never leak into this one.
    /// Returns the fresh session id.
    pub fn start(
        &mut self,
        now_ms: u64,
        connected: bool,
        feedback: &mut FeedbackQueue,
    ) -> Option<String> {
        if self.session.active {
            tracing::warn!(req_id = %self.session.id, "start ignored, session already recording");
            return None;
        }
        if !connected {
            tracing::warn!("start ignored, gateway not connected");
            return None;
        }

        let id = self.next_id(now_ms);
        feedback.clear();
        self.session = Session {
            id: id.clone(),
            active: true,
            started_at_ms: now_ms,
            chunks_sent: 0,
            chunks_dropped: 0,
        };

        tracing::info!(req_id = %id, "recording started");
        Some(id)
    }

    /// Pump one chunk from the microphone to the sink
    pub fn capture_and_send_tick(
        &mut self,
        now_ms: u64,
        input: &mut dyn AudioInput,
        sink: &mut dyn FrameSink,
    ) -> CaptureOutcome {
        if !self.session.active {
            return CaptureOutcome::Idle;
        }

        if now_ms.saturating_sub(self.session.started_at_ms) > self.max_record_ms {
            let id = self.finish("timeout");
            return CaptureOutcome::TimedOut(id);
        }

        if !input.is_enabled() || !input.try_record(&mut self.samples) {
            return CaptureOutcome::NotReady;
        }

        self.frame.clear();
        encode_pcm_le(&self.samples, &mut self.frame);

        if sink.send_audio(&self.frame) {
            self.session.chunks_sent += 1;
            CaptureOutcome::Sent
        } else {
            self.session.chunks_dropped += 1;
            CaptureOutcome::Dropped
        }
    }

    /// Stop the active session
    ///
    /// Returns the ended session id, or `None` when already idle.
    pub fn stop(&mut self) -> Option<String> {
        if !self.session.active {
            return None;
        }
        Some(self.finish("released"))
    }

    fn finish(&mut self, reason: &str) -> String {
        self.session.active = false;
        tracing::info!(
            req_id = %self.session.id,
            reason,
            chunks_sent = self.session.chunks_sent,
            chunks_dropped = self.session.chunks_dropped,
            "recording stopped"
        );
        std::mem::take(&mut self.session.id)
    }

    /// `req-<device>-<ms>`, with the ms part strictly increasing
    fn next_id(&mut self, now_ms: u64) -> String {
        let ms = match self.last_id_ms {
            Some(last) if now_ms <= last => last + 1,
            _ => now_ms,
        };
        self.last_id_ms = Some(ms);
        format!("req-{}-{ms}", self.device_id)
    }
}
