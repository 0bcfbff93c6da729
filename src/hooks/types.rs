//! Hook notification types

use serde::{Deserialize, Deserializer};

/// Synthetic event name raised when the gateway connection comes up
pub const CONNECTED_EVENT: &str = "Connected";

/// A status notification pushed by the gateway
///
/// Wire shape: `{"type": "hook", "id": "...", "hook_event_name": "..."}`.
/// Missing or non-string fields decode as empty strings; an empty id
/// disables dedup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HookNotification {
    /// Delivery id, shared by retransmissions of the same event
    #[serde(default, deserialize_with = "string_or_empty")]
    pub id: String,

    /// Assistant lifecycle event name (e.g. `PermissionRequest`)
    #[serde(default, deserialize_with = "string_or_empty")]
    pub hook_event_name: String,
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

impl HookNotification {
    #[must_use]
    pub fn new(id: &str, hook_event_name: &str) -> Self {
        Self {
            id: id.to_string(),
            hook_event_name: hook_event_name.to_string(),
        }
    }
}

/// What the router did with a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDisposition {
    /// A beep of this kind was queued
    Queued(crate::feedback::BeepKind),
    /// Same id seen recently, dropped
    Duplicate,
    /// Event name has no feedback mapping
    Ignored,
}
