//! Beacon PTT - Push-to-talk voice client for the Beacon speech gateway
//!
//! Holding the talk button streams microphone audio to the gateway over a
//! WebSocket; releasing it ends the dictation. Assistant status events pushed
//! back by the gateway are turned into short beeps, and four auxiliary
//! buttons relay operator commands.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   ActivityLoop                      │
//! │   Buttons → Session pump → Network pump → Beeps     │
//! └──────┬──────────────────┬──────────────────┬────────┘
//!        │                  │                  │
//! ┌──────▼───────┐ ┌────────▼─────────┐ ┌──────▼───────┐
//! │ Session      │ │ Connectivity     │ │ Feedback     │
//! │ Controller   │ │ Manager          │ │ Queue        │
//! └──────┬───────┘ └────────┬─────────┘ └──────▲───────┘
//!        │                  │ hooks            │
//!   AudioInput      Transport/Resolver   HookEventRouter
//! ```
//!
//! Everything runs on one cooperative loop thread. Hardware sits behind
//! capability traits ([`voice::AudioInput`], [`voice::AudioOutput`],
//! [`connectivity::Transport`], [`connectivity::WifiLink`],
//! [`discovery::Resolver`], [`buttons::ButtonPanel`],
//! [`power::PowerControl`], [`clock::Clock`]) with host implementations in
//! the same modules.

pub mod activity;
pub mod buttons;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod discovery;
pub mod error;
pub mod feedback;
pub mod hooks;
pub mod power;
pub mod session;
pub mod voice;

pub use activity::{ActivityLoop, Peripherals, TickOutcome};
pub use config::Config;
pub use connectivity::ConnectivityManager;
pub use error::{Error, Result};
pub use feedback::{BeepKind, FeedbackQueue};
pub use hooks::HookEventRouter;
pub use session::{SessionController, SessionState};
