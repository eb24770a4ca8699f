//! Unified conversation schema shared by every converter and the store

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::convert::common::now_iso;

pub const UNTITLED: &str = "Untitled Conversation";

/// A normalized conversation, the unit of storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Surrogate rowid; storage-internal, never serialized
    #[serde(skip)]
    pub id: Option<i64>,
    pub conversation_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_source() -> String {
    "unknown".to_string()
}

fn default_model() -> String {
    "unknown".to_string()
}

impl Conversation {
    /// Empty conversation with the given natural key and all other fields defaulted
    pub fn new(conversation_id: impl Into<String>) -> Self {
        let now = now_iso();
        Self {
            id: None,
            conversation_id: conversation_id.into(),
            title: UNTITLED.to_string(),
            created_at: now.clone(),
            updated_at: now,
            source: default_source(),
            model: default_model(),
            messages: Vec::new(),
            tags: Vec::new(),
            starred: false,
            archived: false,
            metadata: Map::new(),
        }
    }

    /// Bump `updated_at` to the current time
    pub fn touch(&mut self) {
        self.updated_at = now_iso();
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Replace the tag list, dropping duplicates and blank entries
    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.tags = dedup_tags(tags);
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id,
            conversation_id: self.conversation_id.clone(),
            title: self.title.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
            source: self.source.clone(),
            model: self.model.clone(),
            message_count: self.messages.len(),
            tags: self.tags.clone(),
            starred: self.starred,
            archived: self.archived,
        }
    }
}

/// Keeps the first occurrence of every non-blank tag
pub fn dedup_tags<I>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// List-view projection of a conversation (no message bodies)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub id: Option<i64>,
    pub conversation_id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub source: String,
    pub model: String,
    pub message_count: usize,
    pub tags: Vec<String>,
    pub starred: bool,
    pub archived: bool,
}

// ============================================
// QUERY TYPES
// ============================================

/// Source predicate for list queries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SourceFilter {
    #[default]
    All,
    /// Substring "gpt" in source or model, case-insensitive
    Gpt,
    /// Substring "claude" in source or model, case-insensitive
    Claude,
    /// Exact match on `source`
    Exact(String),
}

impl SourceFilter {
    pub fn is_all(&self) -> bool {
        matches!(self, SourceFilter::All)
    }

    pub fn matches(&self, source: &str, model: &str) -> bool {
        match self {
            SourceFilter::All => true,
            SourceFilter::Gpt => contains_ci(source, "gpt") || contains_ci(model, "gpt"),
            SourceFilter::Claude => {
                contains_ci(source, "claude") || contains_ci(model, "claude")
            }
            SourceFilter::Exact(s) => source == s,
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

impl FromStr for SourceFilter {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "" | "all" => SourceFilter::All,
            "gpt" => SourceFilter::Gpt,
            "claude" => SourceFilter::Claude,
            _ => SourceFilter::Exact(s.trim().to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Newest => "DESC",
            SortOrder::Oldest => "ASC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Newest => write!(f, "newest"),
            SortOrder::Oldest => write!(f, "oldest"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    pub offset: usize,
    /// `None` means no limit
    pub limit: Option<usize>,
    pub source: SourceFilter,
    pub sort: SortOrder,
    pub starred: Option<bool>,
    pub archived: Option<bool>,
    pub tag: Option<String>,
    pub count_only: bool,
}

impl ConversationFilter {
    /// True when at least one predicate beyond `source = all` is set
    pub fn has_predicates(&self) -> bool {
        !self.source.is_all()
            || self.starred.is_some()
            || self.archived.is_some()
            || self.tag.is_some()
    }

    pub fn matches(&self, conversation: &ConversationSummary) -> bool {
        if !self
            .source
            .matches(&conversation.source, &conversation.model)
        {
            return false;
        }
        if let Some(starred) = self.starred {
            if conversation.starred != starred {
                return false;
            }
        }
        if let Some(archived) = self.archived {
            if conversation.archived != archived {
                return false;
            }
        }
        if let Some(ref tag) = self.tag {
            if !conversation.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        true
    }
}

/// One page of list results; `total` counts every match, not just this page
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Page {
    pub total: usize,
    pub items: Vec<ConversationSummary>,
}

// ============================================
// MUTATION TYPES
// ============================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataUpdate {
    pub tags: Option<Vec<String>>,
    pub starred: Option<bool>,
    pub archived: Option<bool>,
}

impl MetadataUpdate {
    pub fn is_empty(&self) -> bool {
        self.tags.is_none() && self.starred.is_none() && self.archived.is_none()
    }

    /// Apply the set fields and bump `updated_at`
    pub fn apply(&self, conversation: &mut Conversation) {
        if let Some(ref tags) = self.tags {
            conversation.set_tags(tags.clone());
        }
        if let Some(starred) = self.starred {
            conversation.starred = starred;
        }
        if let Some(archived) = self.archived {
            conversation.archived = archived;
        }
        conversation.touch();
    }
}

/// Aggregate result of a bulk mutation; failures are reported, never thrown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl BulkOutcome {
    pub fn record_failure(&mut self, conversation_id: &str, reason: impl fmt::Display) {
        self.failed += 1;
        self.errors.push(format!("{}: {}", conversation_id, reason));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// A raw record that could not be converted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionFailure {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreReport {
    pub new_conversations: usize,
    pub updated_conversations: usize,
    pub failed: Vec<ConversionFailure>,
}
