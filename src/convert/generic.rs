//! Best-effort converter for unrecognized shapes
//!
//! Accepts a bare array of message-like objects or an object carrying a
//! `messages` (or `chat_messages`) array. Every required field gets a default,
//! so this converter never fails.

use serde_json::{Map, Value};

use super::common::{
    content_text, field, format_timestamp, normalize_role, str_field, text_field,
    timestamp_or_now, IdGenerator,
};
use super::{Converter, SourceFormat};
use crate::error::Result;
use crate::model::{Conversation, Message, UNTITLED};

pub struct GenericConverter;

impl Converter for GenericConverter {
    fn format(&self) -> SourceFormat {
        SourceFormat::Generic
    }

    fn convert(&self, raw: &Value, ids: &dyn IdGenerator) -> Result<Conversation> {
        let (container, items): (Option<&Value>, &[Value]) = match raw {
            Value::Array(items) => (None, items.as_slice()),
            Value::Object(_) => {
                let items = raw
                    .get("messages")
                    .or_else(|| raw.get("chat_messages"))
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                (Some(raw), items)
            }
            _ => (None, &[][..]),
        };

        let created_at = timestamp_or_now(container.and_then(|c| {
            field(c, "created_at")
                .or_else(|| field(c, "create_time"))
                .or_else(|| field(c, "timestamp"))
        }));
        let updated_at = container
            .and_then(|c| field(c, "updated_at").or_else(|| field(c, "update_time")))
            .map(format_timestamp)
            .unwrap_or_else(|| created_at.clone());

        let messages = items
            .iter()
            .filter_map(|item| convert_message(item, &created_at, ids))
            .collect();

        let conversation_id = container
            .and_then(|c| {
                text_field(c, "conversation_id")
                    .or_else(|| text_field(c, "id"))
                    .or_else(|| text_field(c, "uuid"))
            })
            .unwrap_or_else(|| ids.generate("conv"));

        let title = container
            .and_then(|c| text_field(c, "title").or_else(|| text_field(c, "name")))
            .unwrap_or_else(|| UNTITLED.to_string());

        let model = container
            .and_then(|c| text_field(c, "model"))
            .unwrap_or_else(|| "unknown".to_string());

        let metadata = container
            .and_then(|c| c.get("metadata"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Ok(Conversation {
            id: None,
            conversation_id,
            title,
            created_at,
            updated_at,
            source: "unknown".to_string(),
            model,
            messages,
            tags: Vec::new(),
            starred: false,
            archived: false,
            metadata,
        })
    }
}

fn convert_message(raw: &Value, default_time: &str, ids: &dyn IdGenerator) -> Option<Message> {
    match raw {
        Value::String(text) => Some(Message {
            id: ids.generate("msg"),
            role: normalize_role(None),
            content: text.clone(),
            created_at: default_time.to_string(),
            metadata: Map::new(),
        }),
        Value::Object(_) => {
            let role = str_field(raw, "role")
                .or_else(|| str_field(raw, "sender"))
                .or_else(|| str_field(raw, "author"))
                .or_else(|| raw.get("author").and_then(|a| str_field(a, "role")));

            let content = raw
                .get("content")
                .and_then(|c| {
                    content_text(c).or_else(|| c.get("parts").and_then(content_text))
                })
                .or_else(|| str_field(raw, "text").map(String::from))
                .or_else(|| str_field(raw, "message").map(String::from))
                .unwrap_or_default();

            let created_at = field(raw, "created_at")
                .or_else(|| field(raw, "timestamp"))
                .or_else(|| field(raw, "create_time"))
                .map(format_timestamp)
                .unwrap_or_else(|| default_time.to_string());

            Some(Message {
                id: text_field(raw, "id")
                    .or_else(|| text_field(raw, "uuid"))
                    .unwrap_or_else(|| ids.generate("msg")),
                role: normalize_role(role),
                content,
                created_at,
                metadata: raw
                    .get("metadata")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            })
        }
        _ => None,
    }
}

/// True when a value plausibly carries messages: an array of objects or
/// strings, or an object with a `messages`/`chat_messages` array
pub fn looks_like_messages(value: &Value) -> bool {
    match value {
        Value::Array(items) => {
            !items.is_empty() && items.iter().all(|i| i.is_object() || i.is_string())
        }
        Value::Object(_) => value
            .get("messages")
            .or_else(|| value.get("chat_messages"))
            .is_some_and(Value::is_array),
        _ => false,
    }
}
