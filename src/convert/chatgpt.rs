//! ChatGPT export converter
//!
//! Data format: `conversations.json` from a ChatGPT data export. Each
//! conversation keeps its messages in a `mapping` of
//! `node_id -> {message?, parent?, children?}` forming a tree (occasionally a
//! DAG with cross-links). `current_node` points at the leaf of the active branch.
//!
//! Linear order is rebuilt by resolving the root from `current_node`, then
//! walking the tree depth-first with an explicit stack and a visited-set so
//! cyclic or duplicated links always terminate.

use serde_json::{Map, Value};
use std::collections::HashSet;

use super::common::{
    content_text, field, normalize_role, str_field, text_field, timestamp_or_now, format_timestamp,
    IdGenerator,
};
use super::{Converter, SourceFormat};
use crate::error::Result;
use crate::model::{Conversation, Message, UNTITLED};

pub const UNKNOWN_MODEL: &str = "gpt-unknown";

pub struct ChatGptConverter;

impl Converter for ChatGptConverter {
    fn format(&self) -> SourceFormat {
        SourceFormat::ChatGpt
    }

    fn convert(&self, raw: &Value, ids: &dyn IdGenerator) -> Result<Conversation> {
        let empty = Map::new();
        let mapping = raw
            .get("mapping")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let conversation_id = text_field(raw, "conversation_id")
            .or_else(|| text_field(raw, "id"))
            .unwrap_or_else(|| ids.generate("chatgpt"));

        let created_at = timestamp_or_now(field(raw, "create_time"));
        let updated_at = field(raw, "update_time")
            .map(format_timestamp)
            .unwrap_or_else(|| created_at.clone());

        let messages = linearize(mapping, str_field(raw, "current_node"), &created_at);

        let mut metadata = Map::new();
        for key in ["current_node", "default_model_slug", "is_archived", "plugin_ids"] {
            if let Some(v) = field(raw, key) {
                metadata.insert(key.to_string(), v.clone());
            }
        }

        Ok(Conversation {
            id: None,
            conversation_id,
            title: text_field(raw, "title").unwrap_or_else(|| UNTITLED.to_string()),
            created_at,
            updated_at,
            source: "chatgpt".to_string(),
            model: extract_model(raw, mapping),
            messages,
            tags: Vec::new(),
            starred: false,
            archived: false,
            metadata,
        })
    }
}

/// Messages in conversational order.
///
/// Falls back to every message in the mapping sorted by `created_at` when the
/// walk from `current_node` yields nothing.
pub fn linearize(
    mapping: &Map<String, Value>,
    current_node: Option<&str>,
    default_time: &str,
) -> Vec<Message> {
    let walked: Vec<Message> = current_node
        .and_then(|start| find_root(mapping, start))
        .map(|root| {
            walk(mapping, root)
                .into_iter()
                .filter_map(|node_id| {
                    mapping
                        .get(node_id)
                        .and_then(|node| node_message(node_id, node, default_time))
                })
                .collect()
        })
        .unwrap_or_default();

    if !walked.is_empty() {
        return walked;
    }

    let mut messages: Vec<Message> = mapping
        .iter()
        .filter_map(|(node_id, node)| node_message(node_id, node, default_time))
        .collect();
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    messages
}

/// Follow `parent` links up from `start` to the topmost node still in the mapping
fn find_root<'a>(mapping: &'a Map<String, Value>, start: &'a str) -> Option<&'a str> {
    if !mapping.contains_key(start) {
        return None;
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut node_id = start;
    loop {
        visited.insert(node_id);
        let parent = mapping
            .get(node_id)
            .and_then(|node| str_field(node, "parent"))
            .filter(|p| mapping.contains_key(*p) && !visited.contains(p));
        match parent {
            Some(p) => node_id = p,
            None => return Some(node_id),
        }
    }
}

/// Pre-order traversal from `root`, children in listed order, each node once
fn walk<'a>(mapping: &'a Map<String, Value>, root: &'a str) -> Vec<&'a str> {
    let mut order = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack = vec![root];

    while let Some(node_id) = stack.pop() {
        if !visited.insert(node_id) {
            continue;
        }
        let Some(node) = mapping.get(node_id) else {
            continue;
        };
        order.push(node_id);

        if let Some(children) = node.get("children").and_then(Value::as_array) {
            for child in children.iter().rev().filter_map(Value::as_str) {
                if !visited.contains(child) {
                    stack.push(child);
                }
            }
        }
    }

    order
}

fn node_message(node_id: &str, node: &Value, default_time: &str) -> Option<Message> {
    let message = node.get("message").filter(|m| m.is_object())?;

    let role = message
        .get("author")
        .and_then(|a| str_field(a, "role"));

    let content = message
        .get("content")
        .and_then(|c| {
            c.get("parts")
                .and_then(content_text)
                .or_else(|| str_field(c, "text").map(String::from))
        })
        .unwrap_or_default();

    let created_at = field(message, "create_time")
        .map(format_timestamp)
        .unwrap_or_else(|| default_time.to_string());

    let mut metadata = Map::new();
    metadata.insert("node_id".to_string(), Value::String(node_id.to_string()));
    if let Some(slug) = message.get("metadata").and_then(|m| field(m, "model_slug")) {
        metadata.insert("model_slug".to_string(), slug.clone());
    }
    if let Some(kind) = message.get("content").and_then(|c| field(c, "content_type")) {
        metadata.insert("content_type".to_string(), kind.clone());
    }

    Some(Message {
        id: text_field(message, "id").unwrap_or_else(|| node_id.to_string()),
        role: normalize_role(role),
        content,
        created_at,
        metadata,
    })
}

fn extract_model(raw: &Value, mapping: &Map<String, Value>) -> String {
    mapping
        .values()
        .filter_map(|node| node.get("message"))
        .filter_map(|message| message.get("metadata"))
        .find_map(|meta| text_field(meta, "model_slug"))
        .or_else(|| text_field(raw, "default_model_slug"))
        .unwrap_or_else(|| UNKNOWN_MODEL.to_string())
}
