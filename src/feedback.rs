//! Audible feedback queue
//!
//! Beep requests arrive from network events at any time, but the audio path
//! belongs to the microphone while a session records. Requests are counted
//! per category and played back later, in a fixed priority order, once the
//! session controller reports idle.

use crate::clock::Clock;
use crate::voice::{AudioInput, AudioOutput};

/// Pause after each played beep group
const INTER_BEEP_PAUSE_MS: u64 = 120;

/// Feedback category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeepKind {
    /// The assistant stopped
    Stop,
    /// The assistant needs permission or attention
    Permission,
    /// A tool call failed
    Failure,
    /// The gateway connection is up
    Start,
}

impl BeepKind {
    /// Playback order, highest priority first
    pub const PRIORITY: [Self; 4] = [Self::Start, Self::Permission, Self::Failure, Self::Stop];

    /// Tone pattern for this category
    #[must_use]
    pub const fn pattern(self) -> BeepPattern {
        match self {
            Self::Permission => BeepPattern::new(2000, 80, 2, 60),
            Self::Failure => BeepPattern::new(800, 200, 3, 80),
            Self::Start => BeepPattern::new(2400, 100, 1, 0),
            Self::Stop => BeepPattern::new(1800, 60, 2, 80),
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Stop => 0,
            Self::Permission => 1,
            Self::Failure => 2,
            Self::Start => 3,
        }
    }
}

impl std::fmt::Display for BeepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Permission => write!(f, "permission"),
            Self::Failure => write!(f, "failure"),
            Self::Start => write!(f, "start"),
        }
    }
}

/// A repeated tone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeepPattern {
    pub freq_hz: u16,
    pub duration_ms: u16,
    pub repeat: u8,
    pub gap_ms: u16,
}

impl BeepPattern {
    #[must_use]
    pub const fn new(freq_hz: u16, duration_ms: u16, repeat: u8, gap_ms: u16) -> Self {
        Self {
            freq_hz,
            duration_ms,
            repeat,
            gap_ms,
        }
    }

    /// Play every repeat, waiting out each tone and its gap
    pub fn play(self, output: &mut dyn AudioOutput, clock: &dyn Clock) {
        for _ in 0..self.repeat {
            output.tone(self.freq_hz, self.duration_ms);
            clock.delay_ms(u64::from(self.duration_ms) + u64::from(self.gap_ms));
        }
    }
}

/// Pending beep counters, one per category
#[derive(Debug, Clone)]
pub struct FeedbackQueue {
    pending: [u8; 4],
    volume: u8,
}

impl FeedbackQueue {
    /// Create an empty queue that plays at `volume`
    #[must_use]
    pub const fn new(volume: u8) -> Self {
        Self {
            pending: [0; 4],
            volume,
        }
    }

    /// Request one more beep of `kind`
    ///
    /// Saturates at `u8::MAX`. Never plays anything itself.
    pub fn queue(&mut self, kind: BeepKind) {
        let slot = &mut self.pending[kind.index()];
        *slot = slot.saturating_add(1);
        tracing::debug!(kind = %kind, pending = *slot, "beep queued");
    }

    /// Pending count for `kind`
    #[must_use]
    pub const fn pending(&self, kind: BeepKind) -> u8 {
        self.pending[kind.index()]
    }

    /// Whether any beep is waiting
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.iter().any(|&n| n > 0)
    }

    /// Drop every pending beep
    pub fn clear(&mut self) {
        self.pending = [0; 4];
    }

    /// Play everything pending in priority order, then reset the counters
    ///
    /// Call only while no session is recording. Borrows the audio path from
    /// the microphone for the duration and hands it back afterwards. Blocks
    /// until all tones have played. Returns the number of beep groups played.
    pub fn drain_and_play(
        &mut self,
        input: &mut dyn AudioInput,
        output: &mut dyn AudioOutput,
        clock: &dyn Clock,
    ) -> usize {
        if !self.has_pending() {
            return 0;
        }

        let counts = std::mem::take(&mut self.pending);
        tracing::debug!(
            start = counts[BeepKind::Start.index()],
            permission = counts[BeepKind::Permission.index()],
            failure = counts[BeepKind::Failure.index()],
            stop = counts[BeepKind::Stop.index()],
            "playing pending beeps"
        );

        input.end();
        if let Err(e) = output.begin() {
            tracing::warn!(error = %e, "speaker unavailable, dropping pending beeps");
            restore_capture(input);
            return 0;
        }
        output.set_volume(self.volume);

        let mut played = 0;
        for kind in BeepKind::PRIORITY {
            let pattern = kind.pattern();
            for _ in 0..counts[kind.index()] {
                pattern.play(output, clock);
                clock.delay_ms(INTER_BEEP_PAUSE_MS);
                played += 1;
            }
        }

        output.end();
        restore_capture(input);
        played
    }
}

fn restore_capture(input: &mut dyn AudioInput) {
    if let Err(e) = input.begin() {
        tracing::warn!(error = %e, "failed to re-enable microphone after playback");
    }
}
