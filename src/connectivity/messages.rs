//! Gateway wire protocol
//!
//! Outbound control messages are JSON text frames tagged by `type`. Audio
//! travels separately as binary frames.

use serde::Serialize;

use crate::Result;
use crate::hooks::HookNotification;

/// Operator command relayed to the assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    Approve,
    Reject,
    SwitchModel,
    ToggleAutoApprove,
}

impl CommandAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::SwitchModel => "switch_model",
            Self::ToggleAutoApprove => "toggle_auto_approve",
        }
    }
}

impl std::fmt::Display for CommandAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client to gateway text message
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage<'a> {
    /// Open a dictation session
    Start {
        token: &'a str,
        #[serde(rename = "reqId")]
        req_id: &'a str,
        mode: &'a str,
        format: &'a str,
        #[serde(rename = "sampleRate")]
        sample_rate: u32,
        channels: u16,
        #[serde(rename = "bitDepth")]
        bit_depth: u16,
    },

    /// Close a dictation session
    End {
        #[serde(rename = "reqId")]
        req_id: &'a str,
    },

    /// Operator command
    Command { action: CommandAction },
}

impl ClientMessage<'_> {
    /// Encode as a JSON text frame
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Gateway to client text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Assistant lifecycle notification
    Hook(HookNotification),

    /// Session accepted
    Ack { req_id: String },

    /// Final transcript for a session
    Result { req_id: String, text: String },

    /// Any other well-formed payload, by its `type` (empty if absent)
    Other(String),
}

/// Decode one inbound text frame
///
/// # Errors
///
/// Returns error if the payload is not a JSON object
pub fn parse_server_message(text: &str) -> Result<ServerMessage> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let Some(obj) = value.as_object() else {
        return Err(crate::Error::Transport(
            "server message is not a JSON object".to_string(),
        ));
    };

    let field = |name: &str| {
        obj.get(name)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let message = match obj.get("type").and_then(serde_json::Value::as_str) {
        // Non-string id or name decodes as empty, still routed without dedup
        Some("hook") => ServerMessage::Hook(HookNotification {
            id: field("id"),
            hook_event_name: field("hook_event_name"),
        }),
        Some("ack") => ServerMessage::Ack {
            req_id: field("reqId"),
        },
        Some("result") => ServerMessage::Result {
            req_id: field("reqId"),
            text: field("text"),
        },
        other => ServerMessage::Other(other.unwrap_or_default().to_string()),
    };

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_message_shape() {
        let json = ClientMessage::Start {
            token: "tok",
            req_id: "req-ab12-5",
            mode: "paste",
            format: "pcm_s16le",
            sample_rate: 16_000,
            channels: 1,
            bit_depth: 16,
        }
        .to_json()
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "start");
        assert_eq!(value["token"], "tok");
        assert_eq!(value["reqId"], "req-ab12-5");
        assert_eq!(value["mode"], "paste");
        assert_eq!(value["format"], "pcm_s16le");
        assert_eq!(value["sampleRate"], 16_000);
        assert_eq!(value["channels"], 1);
        assert_eq!(value["bitDepth"], 16);
    }

    #[test]
    fn end_and_command_shapes() {
        let end = ClientMessage::End { req_id: "r1" }.to_json().unwrap();
        assert_eq!(end, r#"{"type":"end","reqId":"r1"}"#);

        let cmd = ClientMessage::Command {
            action: CommandAction::ToggleAutoApprove,
        }
        .to_json()
        .unwrap();
        assert_eq!(cmd, r#"{"type":"command","action":"toggle_auto_approve"}"#);
    }

    #[test]
    fn parses_hook() {
        let msg =
            parse_server_message(r#"{"type":"hook","id":"abc","hook_event_name":"Stop"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Hook(HookNotification::new("abc", "Stop")));
    }

    #[test]
    fn hook_with_non_string_fields_still_routes() {
        assert_eq!(
            parse_server_message(r#"{"type":"hook","id":null,"hook_event_name":"Stop"}"#)
                .unwrap(),
            ServerMessage::Hook(HookNotification::new("", "Stop"))
        );
        assert_eq!(
            parse_server_message(r#"{"type":"hook","id":42,"hook_event_name":"Notification"}"#)
                .unwrap(),
            ServerMessage::Hook(HookNotification::new("", "Notification"))
        );
        assert_eq!(
            parse_server_message(r#"{"type":"hook","id":"h9","hook_event_name":7}"#).unwrap(),
            ServerMessage::Hook(HookNotification::new("h9", ""))
        );
        assert_eq!(
            parse_server_message(r#"{"type":"hook"}"#).unwrap(),
            ServerMessage::Hook(HookNotification::default())
        );
    }

    #[test]
    fn parses_ack_and_result() {
        assert_eq!(
            parse_server_message(r#"{"type":"ack","reqId":"r1"}"#).unwrap(),
            ServerMessage::Ack {
                req_id: "r1".to_string()
            }
        );
        assert_eq!(
            parse_server_message(r#"{"type":"result","reqId":"r1","text":"hello"}"#).unwrap(),
            ServerMessage::Result {
                req_id: "r1".to_string(),
                text: "hello".to_string()
            }
        );
    }

    #[test]
    fn unknown_shapes_are_other() {
        assert_eq!(
            parse_server_message(r#"{"type":"pong"}"#).unwrap(),
            ServerMessage::Other("pong".to_string())
        );
        assert_eq!(
            parse_server_message(r#"{"hello":1}"#).unwrap(),
            ServerMessage::Other(String::new())
        );
    }

    #[test]
    fn malformed_payloads_error() {
        assert!(parse_server_message("not json").is_err());
        assert!(parse_server_message("[1,2]").is_err());
    }
}
