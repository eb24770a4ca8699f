//! Whole-archive export/import envelope
//!
//! An envelope wraps every stored conversation together with the schema
//! version it was written at, so a later import can refuse data from a
//! newer archive.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::convert::common::now_iso;
use crate::convert::NATIVE_SOURCE;
use crate::error::{ArchiveError, Result};
use crate::model::Conversation;
use crate::store::SCHEMA_VERSION;

pub const EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportEnvelope {
    pub version: String,
    pub source: String,
    pub exported_at: String,
    pub conversation_count: usize,
    pub schema_version: u32,
    pub conversations: Vec<Conversation>,
}

pub fn build_envelope(conversations: Vec<Conversation>) -> ExportEnvelope {
    ExportEnvelope {
        version: EXPORT_VERSION.to_string(),
        source: NATIVE_SOURCE.to_string(),
        exported_at: now_iso(),
        conversation_count: conversations.len(),
        schema_version: SCHEMA_VERSION,
        conversations,
    }
}

/// Shape check only; `parse_envelope` does the validation
pub fn is_envelope(value: &Value) -> bool {
    value.get("exported_at").is_some() && value.get("conversations").is_some_and(Value::is_array)
}

/// Validate an envelope and return its conversations as a JSON array,
/// ready for `ArchiveStore::store_conversations`
pub fn parse_envelope(value: &Value) -> Result<Value> {
    let source = value.get("source").and_then(Value::as_str).unwrap_or("");
    if source != NATIVE_SOURCE {
        return Err(ArchiveError::validation(format!(
            "not a {} export (source: {:?})",
            NATIVE_SOURCE, source
        )));
    }

    let found = value
        .get("schema_version")
        .and_then(Value::as_u64)
        .ok_or_else(|| ArchiveError::validation("export is missing schema_version"))?;
    let found = u32::try_from(found).unwrap_or(u32::MAX);
    if found > SCHEMA_VERSION {
        return Err(ArchiveError::IncompatibleSchema {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    match value.get("conversations") {
        Some(list @ Value::Array(_)) => Ok(list.clone()),
        _ => Err(ArchiveError::validation("export has no conversations array")),
    }
}
