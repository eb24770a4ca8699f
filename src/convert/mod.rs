//! Format detection and conversion into the unified schema
//!
//! Supported exports:
//! - ChatGPT: `mapping` tree, linearized from `current_node`
//! - Claude: flat `chat_messages`
//! - Native: convokeep's own records (round-trips)
//! - Generic: best-effort fallback for anything message-shaped

mod chatgpt;
mod claude;
pub mod common;
mod detect;
mod generic;
mod native;

pub use chatgpt::ChatGptConverter;
pub use claude::ClaudeConverter;
pub use common::{format_timestamp, normalize_role, IdGenerator, SequentialIds, UuidGenerator};
pub use detect::{detect_format, SourceFormat};
pub use generic::GenericConverter;
pub use native::{NativeConverter, NATIVE_SOURCE};

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{Conversation, ConversionFailure};

/// Converts one raw export record of a single format
pub trait Converter: Send + Sync {
    /// Format this converter handles
    fn format(&self) -> SourceFormat;

    /// Convert a raw record; `ids` supplies ids for anything the source lacks
    fn convert(&self, raw: &Value, ids: &dyn IdGenerator) -> Result<Conversation>;
}

/// Converted records plus the ones that failed, by input position
#[derive(Debug, Default)]
pub struct ConversionOutcome {
    pub conversations: Vec<Conversation>,
    pub failures: Vec<ConversionFailure>,
}

/// Routes raw input through the detector to the matching converter
pub struct ConversionPipeline {
    ids: Arc<dyn IdGenerator>,
    converters: Vec<Box<dyn Converter>>,
}

impl Default for ConversionPipeline {
    fn default() -> Self {
        Self::new(Arc::new(UuidGenerator))
    }
}

impl ConversionPipeline {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        let mut pipeline = Self {
            ids,
            converters: vec![],
        };
        pipeline.register(Box::new(NativeConverter));
        pipeline.register(Box::new(ChatGptConverter));
        pipeline.register(Box::new(ClaudeConverter));
        pipeline.register(Box::new(GenericConverter));
        pipeline
    }

    /// Add a converter; a later registration for the same format wins
    pub fn register(&mut self, converter: Box<dyn Converter>) {
        self.converters.retain(|c| c.format() != converter.format());
        self.converters.push(converter);
    }

    pub fn converter_for(&self, format: SourceFormat) -> Option<&dyn Converter> {
        self.converters
            .iter()
            .find(|c| c.format() == format)
            .map(|c| c.as_ref())
    }

    /// Detect and convert a single record
    pub fn convert_one(&self, raw: &Value) -> Result<Conversation> {
        let format = detect_format(raw);
        debug!(%format, "detected export format");

        let converter = self
            .converter_for(format)
            .or_else(|| self.converter_for(SourceFormat::Generic));

        match converter {
            Some(c) => c.convert(raw, self.ids.as_ref()),
            None => GenericConverter.convert(raw, self.ids.as_ref()),
        }
    }

    /// Convert a single record or a list of records.
    ///
    /// An array counts as a list of conversations when any element looks like
    /// one; otherwise the whole array is a bare message list for the generic
    /// converter. One bad record never aborts the rest.
    pub fn convert_value(&self, raw: &Value) -> ConversionOutcome {
        let mut outcome = ConversionOutcome::default();

        let records: Vec<&Value> = match raw {
            Value::Array(items) if items.iter().any(looks_like_conversation) => {
                items.iter().collect()
            }
            Value::Array(items) if items.is_empty() => vec![],
            _ => vec![raw],
        };

        for (index, record) in records.into_iter().enumerate() {
            match self.convert_one(record) {
                Ok(conversation) => outcome.conversations.push(conversation),
                Err(e) => {
                    warn!(index, error = %e, "skipping record that failed conversion");
                    outcome.failures.push(ConversionFailure {
                        index,
                        error: e.to_string(),
                    });
                }
            }
        }

        outcome
    }
}

fn looks_like_conversation(value: &Value) -> bool {
    if !value.is_object() {
        return false;
    }
    detect_format(value) != SourceFormat::Generic
        || value.get("mapping").is_some()
        || generic::looks_like_messages(value)
}
