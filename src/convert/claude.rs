//! Claude export converter
//!
//! Data format: `conversations.json` from a claude.ai data export. Messages
//! are a flat `chat_messages` array already in conversational order.

use serde_json::{Map, Value};

use super::common::{
    content_text, field, format_timestamp, normalize_role, str_field, text_field,
    timestamp_or_now, IdGenerator,
};
use super::{Converter, SourceFormat};
use crate::error::Result;
use crate::model::{Conversation, Message, UNTITLED};

pub const UNKNOWN_MODEL: &str = "claude-unknown";

pub struct ClaudeConverter;

impl Converter for ClaudeConverter {
    fn format(&self) -> SourceFormat {
        SourceFormat::Claude
    }

    fn convert(&self, raw: &Value, ids: &dyn IdGenerator) -> Result<Conversation> {
        let created_at = timestamp_or_now(field(raw, "created_at"));
        let updated_at = field(raw, "updated_at")
            .map(format_timestamp)
            .unwrap_or_else(|| created_at.clone());

        let chat_messages: &[Value] = raw
            .get("chat_messages")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let messages = chat_messages
            .iter()
            .filter(|m| m.is_object())
            .map(|m| convert_message(m, &created_at, ids))
            .collect();

        let mut metadata = Map::new();
        for key in ["summary", "project_uuid", "account"] {
            if let Some(v) = field(raw, key) {
                metadata.insert(key.to_string(), v.clone());
            }
        }

        Ok(Conversation {
            id: None,
            conversation_id: text_field(raw, "uuid").unwrap_or_else(|| ids.generate("claude")),
            title: text_field(raw, "name").unwrap_or_else(|| UNTITLED.to_string()),
            created_at,
            updated_at,
            source: "claude".to_string(),
            model: extract_model(raw, chat_messages),
            messages,
            tags: Vec::new(),
            starred: false,
            archived: false,
            metadata,
        })
    }
}

fn convert_message(raw: &Value, default_time: &str, ids: &dyn IdGenerator) -> Message {
    let content = text_field(raw, "text")
        .or_else(|| raw.get("content").and_then(content_text))
        .unwrap_or_default();

    let role = str_field(raw, "sender").or_else(|| str_field(raw, "role"));

    let mut metadata = Map::new();
    for key in ["attachments", "files"] {
        if let Some(items) = raw.get(key).and_then(Value::as_array) {
            if !items.is_empty() {
                metadata.insert(key.to_string(), Value::Array(items.clone()));
            }
        }
    }

    Message {
        id: text_field(raw, "uuid").unwrap_or_else(|| ids.generate("msg")),
        role: normalize_role(role),
        content,
        created_at: field(raw, "created_at")
            .map(format_timestamp)
            .unwrap_or_else(|| default_time.to_string()),
        metadata,
    }
}

fn extract_model(raw: &Value, chat_messages: &[Value]) -> String {
    text_field(raw, "model")
        .or_else(|| raw.get("metadata").and_then(|m| text_field(m, "model")))
        .or_else(|| {
            chat_messages.iter().find_map(|m| {
                m.get("metadata")
                    .and_then(|meta| text_field(meta, "model"))
                    .or_else(|| text_field(m, "model"))
            })
        })
        .unwrap_or_else(|| UNKNOWN_MODEL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::common::SequentialIds;
    use serde_json::json;

    #[test]
    fn test_minimal_scenario() {
        let raw = json!({"uuid": "u1", "chat_messages": [{"text": "hello", "sender": "human"}]});
        let conv = ClaudeConverter
            .convert(&raw, &SequentialIds::default())
            .unwrap();
        assert_eq!(conv.conversation_id, "u1");
        assert_eq!(conv.source, "claude");
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].role, "user");
        assert_eq!(conv.messages[0].content, "hello");
        assert_eq!(conv.model, UNKNOWN_MODEL);
        assert_eq!(conv.title, UNTITLED);
    }

    #[test]
    fn test_content_blocks_used_when_text_missing() {
        let raw = json!({
            "name": "Blocks",
            "chat_messages": [{
                "sender": "assistant",
                "content": [
                    {"type": "text", "text": "part one"},
                    {"type": "tool_use", "name": "web_search"},
                    {"type": "text", "text": "part two"}
                ]
            }]
        });
        let conv = ClaudeConverter
            .convert(&raw, &SequentialIds::default())
            .unwrap();
        assert_eq!(conv.messages[0].content, "part one\npart two");
        assert_eq!(conv.messages[0].role, "assistant");
        assert_eq!(conv.title, "Blocks");
        assert_eq!(conv.conversation_id, "claude_2");
    }

    #[test]
    fn test_blank_text_falls_back_to_content_blocks() {
        let raw = json!({
            "uuid": "u2",
            "chat_messages": [
                {"sender": "assistant", "text": "", "content": [{"type": "text", "text": "from blocks"}]},
                {"sender": "human", "text": "", "content": []}
            ]
        });
        let conv = ClaudeConverter
            .convert(&raw, &SequentialIds::default())
            .unwrap();
        assert_eq!(conv.messages[0].content, "from blocks");
        assert_eq!(conv.messages[1].content, "");
    }

    #[test]
    fn test_model_from_conversation_then_messages() {
        let raw = json!({
            "uuid": "u",
            "chat_messages": [
                {"text": "q", "sender": "human"},
                {"text": "a", "sender": "assistant", "metadata": {"model": "claude-3-opus"}}
            ]
        });
        let conv = ClaudeConverter
            .convert(&raw, &SequentialIds::default())
            .unwrap();
        assert_eq!(conv.model, "claude-3-opus");

        let raw = json!({
            "uuid": "u",
            "metadata": {"model": "claude-3-5-sonnet"},
            "chat_messages": [{"text": "a", "metadata": {"model": "claude-3-opus"}}]
        });
        let conv = ClaudeConverter
            .convert(&raw, &SequentialIds::default())
            .unwrap();
        assert_eq!(conv.model, "claude-3-5-sonnet");
    }

    #[test]
    fn test_timestamps_and_message_ids() {
        let raw = json!({
            "uuid": "u",
            "created_at": "2024-05-01T12:00:00.000000Z",
            "updated_at": "2024-05-02T12:00:00Z",
            "chat_messages": [
                {"uuid": "m1", "text": "q", "sender": "human", "created_at": "2024-05-01T12:00:01Z"},
                {"text": "a", "sender": "assistant"}
            ]
        });
        let conv = ClaudeConverter
            .convert(&raw, &SequentialIds::default())
            .unwrap();
        assert_eq!(conv.created_at, "2024-05-01T12:00:00.000Z");
        assert_eq!(conv.updated_at, "2024-05-02T12:00:00.000Z");
        assert_eq!(conv.messages[0].id, "m1");
        assert_eq!(conv.messages[0].created_at, "2024-05-01T12:00:01.000Z");
        assert_eq!(conv.messages[1].id, "msg_1");
        assert_eq!(conv.messages[1].created_at, conv.created_at);
    }
}
