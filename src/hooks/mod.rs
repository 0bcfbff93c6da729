//! Hook event routing
//!
//! The gateway relays assistant lifecycle hooks (permission prompts, tool
//! failures, stops) to the client. Each one is deduplicated by id and mapped
//! to an audible feedback category.

mod dedup;
mod types;

pub use dedup::{RECENT_ID_CAPACITY, RecentEventIds};
pub use types::{CONNECTED_EVENT, HookDisposition, HookNotification};

use crate::feedback::{BeepKind, FeedbackQueue};

/// Map a hook event name to its feedback category
#[must_use]
pub fn classify(event_name: &str) -> Option<BeepKind> {
    match event_name {
        CONNECTED_EVENT => Some(BeepKind::Start),
        "PermissionRequest" | "Notification" => Some(BeepKind::Permission),
        "PostToolUseFailure" => Some(BeepKind::Failure),
        "Stop" => Some(BeepKind::Stop),
        _ => None,
    }
}

/// Deduplicates hook notifications and turns them into queued beeps
#[derive(Debug, Default)]
pub struct HookEventRouter {
    recent: RecentEventIds,
}

impl HookEventRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one notification into the feedback queue
    pub fn handle(
        &mut self,
        event: &HookNotification,
        feedback: &mut FeedbackQueue,
    ) -> HookDisposition {
        if self.recent.is_duplicate(&event.id) {
            tracing::debug!(
                id = %event.id,
                event = %event.hook_event_name,
                "duplicate hook dropped"
            );
            return HookDisposition::Duplicate;
        }

        match classify(&event.hook_event_name) {
            Some(kind) => {
                tracing::info!(
                    id = %event.id,
                    event = %event.hook_event_name,
                    beep = %kind,
                    "hook received"
                );
                feedback.queue(kind);
                HookDisposition::Queued(kind)
            }
            None => {
                tracing::debug!(event = %event.hook_event_name, "unmapped hook ignored");
                HookDisposition::Ignored
            }
        }
    }

    /// Ids currently held in the dedup window
    #[must_use]
    pub const fn recent_ids(&self) -> &RecentEventIds {
        &self.recent
    }
}
