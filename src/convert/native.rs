//! Native convokeep records (exports and round-trips)
//!
//! The input already uses the unified schema; conversion validates the
//! required fields and fills defaults for anything optional.

use serde_json::{Map, Value};

use super::common::{format_timestamp, now_iso, normalize_role, IdGenerator};
use super::{Converter, SourceFormat};
use crate::error::{ArchiveError, Result};
use crate::model::{dedup_tags, Conversation};

pub const NATIVE_SOURCE: &str = "convokeep";

pub struct NativeConverter;

impl Converter for NativeConverter {
    fn format(&self) -> SourceFormat {
        SourceFormat::Native
    }

    fn convert(&self, raw: &Value, ids: &dyn IdGenerator) -> Result<Conversation> {
        validate(raw)?;

        let mut record = raw.clone();
        if let Some(obj) = record.as_object_mut() {
            normalize_timestamps(obj, &["created_at", "updated_at"]);
            if let Some(Value::Array(messages)) = obj.get_mut("messages") {
                for message in messages.iter_mut().filter_map(Value::as_object_mut) {
                    normalize_timestamps(message, &["created_at"]);
                }
            }
        }

        let mut conversation: Conversation = serde_json::from_value(record).map_err(|e| {
            ArchiveError::validation(format!("malformed native conversation: {}", e))
        })?;

        if conversation.created_at.trim().is_empty() {
            conversation.created_at = now_iso();
        }
        if conversation.updated_at.trim().is_empty() {
            conversation.updated_at = conversation.created_at.clone();
        }
        if conversation.source.trim().is_empty() {
            conversation.source = NATIVE_SOURCE.to_string();
        }
        conversation.tags = dedup_tags(std::mem::take(&mut conversation.tags));

        for message in &mut conversation.messages {
            if message.id.is_empty() {
                message.id = ids.generate("msg");
            }
            if message.role.trim().is_empty() {
                message.role = normalize_role(None);
            }
            if message.created_at.is_empty() {
                message.created_at = conversation.created_at.clone();
            }
        }

        Ok(conversation)
    }
}

/// Rewrite timestamp fields to ISO-8601 UTC before typed parsing. Numbers and
/// non-blank strings go through `format_timestamp`; null and blank become ""
/// and are defaulted after parsing.
fn normalize_timestamps(obj: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        if let Some(v) = obj.get_mut(*key) {
            let blank = match v {
                Value::Null => true,
                Value::String(s) => s.trim().is_empty(),
                _ => false,
            };
            let normalized = if blank {
                String::new()
            } else if v.is_number() || v.is_string() {
                format_timestamp(v)
            } else {
                continue;
            };
            *v = Value::String(normalized);
        }
    }
}

fn validate(raw: &Value) -> Result<()> {
    match raw.get("conversation_id").and_then(Value::as_str) {
        Some(id) if !id.trim().is_empty() => {}
        _ => {
            return Err(ArchiveError::validation(
                "conversation_id must be a non-empty string",
            ))
        }
    }
    if !raw.get("title").is_some_and(Value::is_string) {
        return Err(ArchiveError::validation("title must be a string"));
    }
    if !raw.get("messages").is_some_and(Value::is_array) {
        return Err(ArchiveError::validation("messages must be an array"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::common::SequentialIds;
    use serde_json::json;

    fn full_record() -> Value {
        json!({
            "conversation_id": "c-1",
            "title": "Kept",
            "created_at": "2024-01-01T00:00:00.000Z",
            "updated_at": "2024-01-02T00:00:00.000Z",
            "source": "convokeep",
            "model": "gpt-4o",
            "messages": [
                {"id": "m1", "role": "user", "content": "hi", "created_at": "2024-01-01T00:00:00.000Z", "metadata": {}}
            ],
            "tags": ["work"],
            "starred": true,
            "archived": false,
            "metadata": {"origin": "export"}
        })
    }

    #[test]
    fn test_valid_input_is_identity() {
        let raw = full_record();
        let conv = NativeConverter
            .convert(&raw, &SequentialIds::default())
            .unwrap();
        assert_eq!(serde_json::to_value(&conv).unwrap(), raw);
        assert_eq!(conv.id, None);
    }

    #[test]
    fn test_optional_fields_are_defaulted() {
        let raw = json!({
            "conversation_id": "c-2",
            "title": "Sparse",
            "created_at": 1700000000,
            "source": "convokeep",
            "messages": [{"content": "x"}]
        });
        let conv = NativeConverter
            .convert(&raw, &SequentialIds::default())
            .unwrap();
        assert_eq!(conv.created_at, "2023-11-14T22:13:20.000Z");
        assert_eq!(conv.updated_at, conv.created_at);
        assert_eq!(conv.model, "unknown");
        assert!(conv.tags.is_empty());
        assert!(!conv.starred && !conv.archived);
        assert_eq!(conv.messages[0].id, "msg_1");
        assert_eq!(conv.messages[0].role, "unknown");
        assert_eq!(conv.messages[0].created_at, conv.created_at);
    }

    #[test]
    fn test_string_timestamps_are_normalized_to_utc() {
        let mut raw = full_record();
        raw["created_at"] = json!("2024-01-03T00:00:00+09:00");
        raw["updated_at"] = json!("yesterday");
        raw["messages"][0]["created_at"] = json!(1700000000000_i64);
        let conv = NativeConverter
            .convert(&raw, &SequentialIds::default())
            .unwrap();
        assert_eq!(conv.created_at, "2024-01-02T15:00:00.000Z");
        assert!(conv.updated_at.ends_with('Z'));
        assert_ne!(conv.updated_at, "yesterday");
        assert_eq!(conv.messages[0].created_at, "2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn test_duplicate_tags_are_dropped() {
        let mut raw = full_record();
        raw["tags"] = json!(["a", "b", "a"]);
        let conv = NativeConverter
            .convert(&raw, &SequentialIds::default())
            .unwrap();
        assert_eq!(conv.tags, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_required_fields_fail_validation() {
        for key in ["conversation_id", "title", "messages"] {
            let mut raw = full_record();
            raw.as_object_mut().unwrap().remove(key);
            let err = NativeConverter
                .convert(&raw, &SequentialIds::default())
                .unwrap_err();
            assert!(matches!(err, ArchiveError::Validation(_)), "{}", key);
        }

        let mut raw = full_record();
        raw["title"] = json!(42);
        assert!(NativeConverter
            .convert(&raw, &SequentialIds::default())
            .is_err());
    }

    #[test]
    fn test_wrongly_typed_optional_field_is_a_validation_error() {
        let mut raw = full_record();
        raw["tags"] = json!("work");
        let err = NativeConverter
            .convert(&raw, &SequentialIds::default())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Validation(_)));
    }
}
