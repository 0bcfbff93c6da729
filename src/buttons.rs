//! Physical inputs
//!
//! One press-and-hold talk button plus four auxiliary buttons that each fire
//! an operator command on press. Every button is debounced independently.

use std::io::BufRead;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::connectivity::CommandAction;

/// Every input on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Talk,
    Approve,
    Reject,
    SwitchModel,
    ToggleAutoApprove,
}

impl Button {
    /// All buttons, talk first
    pub const ALL: [Self; 5] = [
        Self::Talk,
        Self::Approve,
        Self::Reject,
        Self::SwitchModel,
        Self::ToggleAutoApprove,
    ];

    /// Operator command for an auxiliary button
    #[must_use]
    pub const fn command(self) -> Option<CommandAction> {
        match self {
            Self::Talk => None,
            Self::Approve => Some(CommandAction::Approve),
            Self::Reject => Some(CommandAction::Reject),
            Self::SwitchModel => Some(CommandAction::SwitchModel),
            Self::ToggleAutoApprove => Some(CommandAction::ToggleAutoApprove),
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Talk => 0,
            Self::Approve => 1,
            Self::Reject => 2,
            Self::SwitchModel => 3,
            Self::ToggleAutoApprove => 4,
        }
    }
}

impl std::fmt::Display for Button {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Talk => "talk",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::SwitchModel => "switch_model",
            Self::ToggleAutoApprove => "toggle_auto_approve",
        };
        f.write_str(name)
    }
}

/// Raw button levels, sampled once per tick
pub trait ButtonPanel {
    /// Whether `button` is held right now
    fn is_pressed(&mut self, button: Button) -> bool;
}

/// A debounced level change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

/// Turns raw levels into debounced edges
///
/// A level change is accepted only once more than `debounce_ms` has passed
/// since the previous accepted edge. A rejected change leaves the stored
/// level alone, so a level that is still different after the window is
/// reported then.
#[derive(Debug, Clone, Copy)]
pub struct EdgeDetector {
    debounce_ms: u64,
    pressed: bool,
    last_edge_ms: Option<u64>,
}

impl EdgeDetector {
    #[must_use]
    pub const fn new(debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            pressed: false,
            last_edge_ms: None,
        }
    }

    /// Feed one sample
    pub fn update(&mut self, pressed: bool, now_ms: u64) -> Option<Edge> {
        if pressed == self.pressed {
            return None;
        }
        if let Some(last) = self.last_edge_ms
            && now_ms.saturating_sub(last) <= self.debounce_ms
        {
            return None;
        }

        self.pressed = pressed;
        self.last_edge_ms = Some(now_ms);
        Some(if pressed { Edge::Pressed } else { Edge::Released })
    }

    /// Last accepted level
    #[must_use]
    pub const fn is_pressed(&self) -> bool {
        self.pressed
    }
}

/// One detector per button
#[derive(Debug, Clone)]
pub struct ButtonEdges {
    detectors: [EdgeDetector; 5],
}

impl ButtonEdges {
    #[must_use]
    pub const fn new(debounce_ms: u64) -> Self {
        Self {
            detectors: [EdgeDetector::new(debounce_ms); 5],
        }
    }

    /// Sample every button and collect the accepted edges, talk first
    pub fn poll(&mut self, panel: &mut dyn ButtonPanel, now_ms: u64) -> Vec<(Button, Edge)> {
        Button::ALL
            .iter()
            .filter_map(|&button| {
                let level = panel.is_pressed(button);
                self.detectors[button.index()]
                    .update(level, now_ms)
                    .map(|edge| (button, edge))
            })
            .collect()
    }
}

/// How long an auxiliary key press is held down
const AUX_PULSE: Duration = Duration::from_millis(60);

#[derive(Debug, Default)]
struct ConsoleState {
    talk: bool,
    aux_pressed_at: [Option<Instant>; 4],
}

/// Keyboard stand-in for the physical buttons
///
/// Reads lines from stdin on a background thread. An empty line or `t`
/// toggles the talk button; `a`, `r`, `m` and `y` tap approve, reject,
/// switch model and toggle auto-approve.
#[derive(Debug, Clone)]
pub struct ConsolePanel {
    state: Arc<Mutex<ConsoleState>>,
}

impl ConsolePanel {
    /// Start the stdin reader
    ///
    /// # Errors
    ///
    /// Returns error if the reader thread cannot be spawned
    pub fn spawn() -> crate::Result<Self> {
        let state = Arc::new(Mutex::new(ConsoleState::default()));
        let reader = Arc::clone(&state);

        std::thread::Builder::new()
            .name("console-buttons".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    apply_key(&reader, line.trim());
                }
                tracing::debug!("console input closed");
            })?;

        tracing::info!("console buttons: Enter toggles talk, a/r/m/y send commands");
        Ok(Self { state })
    }
}

fn apply_key(state: &Mutex<ConsoleState>, key: &str) {
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    let aux = match key {
        "" | "t" => {
            state.talk = !state.talk;
            tracing::debug!(talk = state.talk, "talk toggled");
            return;
        }
        "a" => Button::Approve,
        "r" => Button::Reject,
        "m" => Button::SwitchModel,
        "y" => Button::ToggleAutoApprove,
        other => {
            tracing::warn!(key = %other, "unknown key");
            return;
        }
    };
    state.aux_pressed_at[aux.index() - 1] = Some(Instant::now());
}

impl ButtonPanel for ConsolePanel {
    fn is_pressed(&mut self, button: Button) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match button {
            Button::Talk => state.talk,
            aux => state.aux_pressed_at[aux.index() - 1]
                .is_some_and(|at| at.elapsed() < AUX_PULSE),
        }
    }
}
