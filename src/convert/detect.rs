//! Export format detection
//!
//! Rules are checked in priority order so overlapping shapes resolve the same
//! way every time. Checks are structural: a key must be present, non-null and
//! of the expected JSON type.

use serde_json::Value;
use std::fmt;

use super::common::field;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    /// convokeep's own unified schema (exports, round-trips)
    Native,
    ChatGpt,
    Claude,
    /// Anything message-shaped that no other rule claims
    Generic,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Native => "native",
            SourceFormat::ChatGpt => "chatgpt",
            SourceFormat::Claude => "claude",
            SourceFormat::Generic => "generic",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn detect_format(value: &Value) -> SourceFormat {
    if !value.is_object() {
        return SourceFormat::Generic;
    }

    if is_native(value) {
        SourceFormat::Native
    } else if is_chatgpt(value) {
        SourceFormat::ChatGpt
    } else if is_claude(value) {
        SourceFormat::Claude
    } else {
        SourceFormat::Generic
    }
}

fn is_native(value: &Value) -> bool {
    field(value, "conversation_id").is_some()
        && field(value, "source").is_some()
        && field(value, "created_at").is_some()
        && value.get("messages").is_some_and(Value::is_array)
}

fn is_chatgpt(value: &Value) -> bool {
    value.get("mapping").is_some_and(Value::is_object)
        && (field(value, "title").is_some() || field(value, "create_time").is_some())
}

fn is_claude(value: &Value) -> bool {
    value.get("chat_messages").is_some_and(Value::is_array)
        && (field(value, "uuid").is_some() || field(value, "name").is_some())
}
