//! SQLite schema and versioned migrations
//!
//! The store version lives in `PRAGMA user_version`:
//! - v1: conversations table with the natural-key unique index and the
//!   list-view indexes
//! - v2: tags / starred / archived columns plus the `conversation_tags`
//!   multi-entry index; existing rows are backfilled with defaults

use rusqlite::{params, Connection};
use tracing::info;

use crate::error::Result;
use crate::model::dedup_tags;

pub const SCHEMA_VERSION: u32 = 2;

pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
    /// Row-level work that plain SQL cannot express
    pub backfill: Option<fn(&Connection) -> Result<usize>>,
}

pub const V1_INITIAL_SCHEMA: &str = r#"
-- ============================================
-- CONVERSATIONS
-- ============================================

-- One row per conversation; messages and metadata are JSON documents
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,  -- surrogate key, storage-internal
    conversation_id TEXT NOT NULL,         -- natural key from the export
    title TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,              -- ISO-8601 UTC
    updated_at TEXT NOT NULL,
    source TEXT NOT NULL DEFAULT 'unknown',-- 'chatgpt', 'claude', 'convokeep', 'unknown'
    model TEXT NOT NULL DEFAULT 'unknown',
    message_count INTEGER NOT NULL DEFAULT 0,
    messages TEXT NOT NULL DEFAULT '[]',   -- JSON array, conversational order
    metadata TEXT NOT NULL DEFAULT '{}'    -- JSON object, opaque
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_conversation_id ON conversations(conversation_id);
CREATE INDEX IF NOT EXISTS idx_conversations_source ON conversations(source);
CREATE INDEX IF NOT EXISTS idx_conversations_created_at ON conversations(created_at);
CREATE INDEX IF NOT EXISTS idx_conversations_updated_at ON conversations(updated_at);
CREATE INDEX IF NOT EXISTS idx_conversations_model ON conversations(model);
CREATE INDEX IF NOT EXISTS idx_conversations_title ON conversations(title);
"#;

pub const V2_TAGS_STARRED_ARCHIVED: &str = r#"
ALTER TABLE conversations ADD COLUMN tags TEXT;       -- JSON array of unique strings
ALTER TABLE conversations ADD COLUMN starred INTEGER;
ALTER TABLE conversations ADD COLUMN archived INTEGER;

-- Multi-entry tag index: one row per (conversation, tag)
CREATE TABLE IF NOT EXISTS conversation_tags (
    conversation_pk INTEGER NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY(conversation_pk, tag),
    FOREIGN KEY(conversation_pk) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_conversations_starred ON conversations(starred);
CREATE INDEX IF NOT EXISTS idx_conversations_archived ON conversations(archived);
CREATE INDEX IF NOT EXISTS idx_conversation_tags_tag ON conversation_tags(tag);
"#;

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: V1_INITIAL_SCHEMA,
        backfill: None,
    },
    Migration {
        version: 2,
        name: "tags_starred_archived",
        sql: V2_TAGS_STARRED_ARCHIVED,
        backfill: Some(backfill_curation_fields),
    },
];

/// Every secondary index the current version declares
pub const INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_conversation_id ON conversations(conversation_id)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_source ON conversations(source)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_created_at ON conversations(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_updated_at ON conversations(updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_model ON conversations(model)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_title ON conversations(title)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_starred ON conversations(starred)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_archived ON conversations(archived)",
    "CREATE INDEX IF NOT EXISTS idx_conversation_tags_tag ON conversation_tags(tag)",
];

/// Give every pre-v2 row `tags = []`, `starred = 0`, `archived = 0` and
/// populate the tag index from whatever tags a row already carries
fn backfill_curation_fields(conn: &Connection) -> Result<usize> {
    let rows: Vec<(i64, Option<String>)> = {
        let mut stmt = conn.prepare("SELECT id, tags FROM conversations")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    for (id, raw_tags) in &rows {
        let tags: Vec<String> = raw_tags
            .as_deref()
            .and_then(|t| serde_json::from_str::<Vec<String>>(t).ok())
            .map(dedup_tags)
            .unwrap_or_default();

        conn.execute(
            "UPDATE conversations
             SET tags = ?1, starred = COALESCE(starred, 0), archived = COALESCE(archived, 0)
             WHERE id = ?2",
            params![serde_json::to_string(&tags)?, id],
        )?;
        for tag in &tags {
            conn.execute(
                "INSERT OR IGNORE INTO conversation_tags (conversation_pk, tag) VALUES (?, ?)",
                params![id, tag],
            )?;
        }
    }

    info!(rows = rows.len(), "backfilled tags/starred/archived");
    Ok(rows.len())
}
