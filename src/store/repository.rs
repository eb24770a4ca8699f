//! Read/write operations against the conversations store
//!
//! The repository owns no connection; the facade lends it one per call.
//! Writes that touch `conversations.tags` rewrite the `conversation_tags`
//! rows for that record in the same transaction.

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::convert::common::now_iso;
use crate::convert::ConversionPipeline;
use crate::error::{ArchiveError, Result};
use crate::model::{
    dedup_tags, BulkOutcome, Conversation, ConversationFilter, ConversationSummary,
    MetadataUpdate, Page, StoreReport, TagCount, UNTITLED,
};

pub const DEFAULT_BATCH_SIZE: usize = 100;

const SUMMARY_COLUMNS: &str = "id, conversation_id, title, created_at, updated_at, source, model,
     message_count, tags, starred, archived";

const FULL_COLUMNS: &str = "id, conversation_id, title, created_at, updated_at, source, model,
     message_count, tags, starred, archived, messages, metadata";

pub struct ConversationRepository {
    batch_size: usize,
    pipeline: ConversionPipeline,
}

impl Default for ConversationRepository {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, ConversionPipeline::default())
    }
}

enum Upsert {
    Inserted,
    Updated,
}

/// Stored values an update falls back to when the incoming record leaves them blank
struct ExistingRow {
    id: i64,
    title: String,
    created_at: String,
}

impl ConversationRepository {
    pub fn new(batch_size: usize, pipeline: ConversionPipeline) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pipeline,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_pipeline(mut self, pipeline: ConversionPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn pipeline(&self) -> &ConversionPipeline {
        &self.pipeline
    }

    // ============================================
    // INGESTION
    // ============================================

    /// Convert raw export data (one record or a list) and upsert every result.
    ///
    /// Records that fail conversion are listed in the report; the rest are stored.
    pub fn store_conversations<F>(
        &self,
        conn: &mut Connection,
        raw: &Value,
        on_progress: F,
    ) -> Result<StoreReport>
    where
        F: FnMut(usize, usize),
    {
        let outcome = self.pipeline.convert_value(raw);
        let mut report = self.store_records(conn, &outcome.conversations, on_progress)?;
        report.failed = outcome.failures;
        Ok(report)
    }

    /// Upsert already-normalized records by `conversation_id`.
    ///
    /// A match is replaced in place under its existing surrogate id; only a
    /// blank `title` or `created_at` falls back to the stored value.
    ///
    /// Work is split into batches of `batch_size`, one transaction each. A
    /// batch commits only after every lookup and write in it has returned;
    /// any storage error rolls that batch back and is returned.
    pub fn store_records<F>(
        &self,
        conn: &mut Connection,
        records: &[Conversation],
        mut on_progress: F,
    ) -> Result<StoreReport>
    where
        F: FnMut(usize, usize),
    {
        let total = records.len();
        let mut report = StoreReport::default();
        let mut processed = 0;

        for batch in records.chunks(self.batch_size) {
            let tx = conn.transaction()?;
            for record in batch {
                match upsert(&tx, record)? {
                    Upsert::Inserted => report.new_conversations += 1,
                    Upsert::Updated => report.updated_conversations += 1,
                }
            }
            tx.commit()?;

            processed += batch.len();
            debug!(processed, total, "committed batch");
            on_progress(processed, total);
        }

        info!(
            new = report.new_conversations,
            updated = report.updated_conversations,
            "stored conversations"
        );
        Ok(report)
    }

    // ============================================
    // QUERIES
    // ============================================

    /// Filtered, paginated walk over the `created_at` index.
    ///
    /// `total` counts every match; `items` holds at most `limit` summaries
    /// after skipping `offset` matches. `count_only` returns no items.
    pub fn get_conversations(&self, conn: &Connection, filter: &ConversationFilter) -> Result<Page> {
        if filter.count_only && !filter.has_predicates() {
            return Ok(Page {
                total: count_conversations(conn)?,
                items: Vec::new(),
            });
        }

        let order = filter.sort.as_sql();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM conversations ORDER BY created_at {}, id {}",
            SUMMARY_COLUMNS, order, order
        ))?;
        let rows = stmt.query_map([], summary_from_row)?;

        let mut page = Page::default();
        for row in rows {
            let summary = row?;
            if !filter.matches(&summary) {
                continue;
            }
            page.total += 1;
            if filter.count_only || page.total <= filter.offset {
                continue;
            }
            if filter.limit.map_or(true, |limit| page.items.len() < limit) {
                page.items.push(summary);
            }
        }

        Ok(page)
    }

    /// Full record, messages included
    pub fn get_conversation_by_id(
        &self,
        conn: &Connection,
        conversation_id: &str,
    ) -> Result<Option<Conversation>> {
        load_conversation(conn, conversation_id)
    }

    pub fn has_conversations(&self, conn: &Connection) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM conversations)",
            [],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn count_conversations(&self, conn: &Connection) -> Result<usize> {
        count_conversations(conn)
    }

    /// Every record, oldest first
    pub fn all_conversations(&self, conn: &Connection) -> Result<Vec<Conversation>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM conversations ORDER BY created_at ASC, id ASC",
            FULL_COLUMNS
        ))?;
        let rows = stmt.query_map([], conversation_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Conversation counts per `source`, largest first
    pub fn source_counts(&self, conn: &Connection) -> Result<Vec<(String, usize)>> {
        let mut stmt = conn.prepare(
            "SELECT source, COUNT(*) FROM conversations GROUP BY source ORDER BY COUNT(*) DESC, source",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // ============================================
    // MUTATIONS
    // ============================================

    pub fn update_conversation_metadata(
        &self,
        conn: &mut Connection,
        conversation_id: &str,
        update: &MetadataUpdate,
    ) -> Result<Conversation> {
        let tx = conn.transaction()?;
        let conversation = apply_update(&tx, conversation_id, update)?;
        tx.commit()?;
        Ok(conversation)
    }

    /// Apply `update` to each id independently; failures are collected, not thrown
    pub fn bulk_update_conversations(
        &self,
        conn: &mut Connection,
        conversation_ids: &[String],
        update: &MetadataUpdate,
    ) -> Result<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        let mut tx = conn.transaction()?;

        for id in conversation_ids {
            let sp = tx.savepoint()?;
            match apply_update(&sp, id, update) {
                Ok(_) => {
                    sp.commit()?;
                    outcome.succeeded += 1;
                }
                Err(e) => {
                    drop(sp);
                    record_failure(&mut outcome, id, e);
                }
            }
        }

        tx.commit()?;
        debug!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "bulk update finished"
        );
        Ok(outcome)
    }

    /// Delete each id independently; `succeeded` is the number deleted
    pub fn bulk_delete_conversations(
        &self,
        conn: &mut Connection,
        conversation_ids: &[String],
    ) -> Result<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        let mut tx = conn.transaction()?;

        for id in conversation_ids {
            let sp = tx.savepoint()?;
            let deleted = sp
                .execute(
                    "DELETE FROM conversations WHERE conversation_id = ?",
                    params![id],
                )
                .map_err(ArchiveError::from)
                .and_then(|n| {
                    if n == 0 {
                        Err(ArchiveError::not_found(id.as_str()))
                    } else {
                        Ok(n)
                    }
                });
            match deleted {
                Ok(_) => {
                    sp.commit()?;
                    outcome.succeeded += 1;
                }
                Err(e) => {
                    drop(sp);
                    record_failure(&mut outcome, id, e);
                }
            }
        }

        tx.commit()?;
        info!(
            deleted = outcome.succeeded,
            failed = outcome.failed,
            "bulk delete finished"
        );
        Ok(outcome)
    }

    /// Remove every conversation; returns how many were removed
    pub fn clear_database(&self, conn: &mut Connection) -> Result<usize> {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM conversation_tags", [])?;
        let removed = tx.execute("DELETE FROM conversations", [])?;
        tx.commit()?;
        info!(removed, "cleared store");
        Ok(removed)
    }

    // ============================================
    // TAGS
    // ============================================

    /// OR (`match_all = false` or a single tag) goes through the tag index;
    /// AND over several tags scans every record for a superset of `tags`.
    pub fn get_conversations_by_tags(
        &self,
        conn: &Connection,
        tags: &[String],
        match_all: bool,
    ) -> Result<Vec<ConversationSummary>> {
        let tags = dedup_tags(tags.iter().cloned());
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();

        if !match_all || tags.len() == 1 {
            let mut seen: HashSet<String> = HashSet::new();
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM conversations
                 WHERE id IN (SELECT conversation_pk FROM conversation_tags WHERE tag = ?)
                 ORDER BY created_at DESC, id DESC",
                SUMMARY_COLUMNS
            ))?;
            for tag in &tags {
                for row in stmt.query_map(params![tag], summary_from_row)? {
                    let summary = row?;
                    if seen.insert(summary.conversation_id.clone()) {
                        results.push(summary);
                    }
                }
            }
            results.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM conversations ORDER BY created_at DESC, id DESC",
                SUMMARY_COLUMNS
            ))?;
            for row in stmt.query_map([], summary_from_row)? {
                let summary = row?;
                if tags.iter().all(|t| summary.tags.contains(t)) {
                    results.push(summary);
                }
            }
        }

        Ok(results)
    }

    /// Every tag with its usage count, most used first, then alphabetical
    pub fn get_all_tags(&self, conn: &Connection) -> Result<Vec<TagCount>> {
        let mut stmt = conn.prepare(
            "SELECT tag, COUNT(*) AS n FROM conversation_tags
             GROUP BY tag ORDER BY n DESC, tag ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TagCount {
                tag: row.get(0)?,
                count: row.get::<_, i64>(1)? as usize,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Replace `old` with `new` on every record carrying `old`; returns records touched
    pub fn rename_tag(&self, conn: &mut Connection, old: &str, new: &str) -> Result<usize> {
        let (old, new) = (old.trim(), new.trim());
        if old.is_empty() || new.is_empty() {
            return Err(ArchiveError::validation("tag names must not be blank"));
        }
        if old == new {
            return Ok(0);
        }
        let touched = rewrite_tag(conn, old, Some(new))?;
        info!(old, new, touched, "renamed tag");
        Ok(touched)
    }

    /// Remove `tag` from every record carrying it; returns records touched
    pub fn delete_tag(&self, conn: &mut Connection, tag: &str) -> Result<usize> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ArchiveError::validation("tag name must not be blank"));
        }
        let touched = rewrite_tag(conn, tag, None)?;
        info!(tag, touched, "deleted tag");
        Ok(touched)
    }
}

fn record_failure(outcome: &mut BulkOutcome, conversation_id: &str, err: ArchiveError) {
    if err.is_not_found() {
        outcome.record_failure(conversation_id, "not found");
    } else {
        warn!(conversation_id, error = %err, "bulk operation failed for record");
        outcome.record_failure(conversation_id, err);
    }
}

// ============================================
// ROW-LEVEL HELPERS
// ============================================

fn count_conversations(conn: &Connection) -> Result<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
    Ok(n as usize)
}

fn upsert(conn: &Connection, record: &Conversation) -> Result<Upsert> {
    let mut record = record.clone();
    let incoming_tags = std::mem::take(&mut record.tags);
    record.set_tags(incoming_tags);

    match find_existing(conn, &record.conversation_id)? {
        Some(existing) => {
            if record.title.trim().is_empty() {
                record.title = existing.title;
            }
            if record.created_at.trim().is_empty() {
                record.created_at = existing.created_at;
            }
            if record.updated_at.trim().is_empty() {
                record.updated_at = now_iso();
            }

            record.id = Some(existing.id);
            write_record(conn, &record)?;
            Ok(Upsert::Updated)
        }
        None => {
            if record.title.trim().is_empty() {
                warn!(conversation_id = %record.conversation_id, "missing title, using default");
                record.title = UNTITLED.to_string();
            }
            if record.created_at.trim().is_empty() {
                warn!(conversation_id = %record.conversation_id, "missing created_at, using now");
                record.created_at = now_iso();
            }
            if record.updated_at.trim().is_empty() {
                record.updated_at = record.created_at.clone();
            }

            conn.execute(
                "INSERT INTO conversations
                 (conversation_id, title, created_at, updated_at, source, model,
                  message_count, messages, tags, starred, archived, metadata)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.conversation_id,
                    record.title,
                    record.created_at,
                    record.updated_at,
                    record.source,
                    record.model,
                    record.messages.len() as i64,
                    serde_json::to_string(&record.messages)?,
                    serde_json::to_string(&record.tags)?,
                    record.starred,
                    record.archived,
                    serde_json::to_string(&record.metadata)?,
                ],
            )?;
            let id = conn.last_insert_rowid();
            write_tag_index(conn, id, &record.tags)?;
            Ok(Upsert::Inserted)
        }
    }
}

fn find_existing(conn: &Connection, conversation_id: &str) -> Result<Option<ExistingRow>> {
    conn.query_row(
        "SELECT id, title, created_at FROM conversations WHERE conversation_id = ?",
        params![conversation_id],
        |row| {
            Ok(ExistingRow {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

/// Overwrite every column of a stored record, keyed by its surrogate id
fn write_record(conn: &Connection, record: &Conversation) -> Result<()> {
    let id = record
        .id
        .ok_or_else(|| ArchiveError::not_found(record.conversation_id.as_str()))?;

    conn.execute(
        "UPDATE conversations SET
             title = ?, created_at = ?, updated_at = ?, source = ?, model = ?,
             message_count = ?, messages = ?, tags = ?, starred = ?, archived = ?, metadata = ?
         WHERE id = ?",
        params![
            record.title,
            record.created_at,
            record.updated_at,
            record.source,
            record.model,
            record.messages.len() as i64,
            serde_json::to_string(&record.messages)?,
            serde_json::to_string(&record.tags)?,
            record.starred,
            record.archived,
            serde_json::to_string(&record.metadata)?,
            id,
        ],
    )?;
    write_tag_index(conn, id, &record.tags)
}

/// Only the curation columns; message bodies are left untouched
fn write_curation(conn: &Connection, id: i64, record: &CurationRow) -> Result<()> {
    conn.execute(
        "UPDATE conversations SET tags = ?, starred = ?, archived = ?, updated_at = ? WHERE id = ?",
        params![
            serde_json::to_string(&record.tags)?,
            record.starred,
            record.archived,
            record.updated_at,
            id,
        ],
    )?;
    write_tag_index(conn, id, &record.tags)
}

fn write_tag_index(conn: &Connection, id: i64, tags: &[String]) -> Result<()> {
    conn.execute(
        "DELETE FROM conversation_tags WHERE conversation_pk = ?",
        params![id],
    )?;
    let mut stmt =
        conn.prepare_cached("INSERT OR IGNORE INTO conversation_tags (conversation_pk, tag) VALUES (?, ?)")?;
    for tag in tags {
        stmt.execute(params![id, tag])?;
    }
    Ok(())
}

struct CurationRow {
    tags: Vec<String>,
    starred: bool,
    archived: bool,
    updated_at: String,
}

fn apply_update(
    conn: &Connection,
    conversation_id: &str,
    update: &MetadataUpdate,
) -> Result<Conversation> {
    let mut conversation = load_conversation(conn, conversation_id)?
        .ok_or_else(|| ArchiveError::not_found(conversation_id))?;
    let id = conversation
        .id
        .ok_or_else(|| ArchiveError::not_found(conversation_id))?;

    update.apply(&mut conversation);
    write_curation(
        conn,
        id,
        &CurationRow {
            tags: conversation.tags.clone(),
            starred: conversation.starred,
            archived: conversation.archived,
            updated_at: conversation.updated_at.clone(),
        },
    )?;
    Ok(conversation)
}

/// Walk the records carrying `tag` and drop it, adding `replacement` where absent
fn rewrite_tag(conn: &mut Connection, tag: &str, replacement: Option<&str>) -> Result<usize> {
    let tx = conn.transaction()?;

    let targets: Vec<(i64, Vec<String>, bool, bool)> = {
        let mut stmt = tx.prepare(
            "SELECT c.id, c.tags, c.starred, c.archived FROM conversations c
             JOIN conversation_tags t ON t.conversation_pk = c.id
             WHERE t.tag = ?",
        )?;
        let rows = stmt.query_map(params![tag], |row| {
            Ok((row.get(0)?, json_column(row, 1)?, row.get(2)?, row.get(3)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    let now = now_iso();
    for (id, mut tags, starred, archived) in targets.iter().cloned() {
        tags.retain(|t| t != tag);
        if let Some(new) = replacement {
            if !tags.iter().any(|t| t == new) {
                tags.push(new.to_string());
            }
        }
        write_curation(
            &tx,
            id,
            &CurationRow {
                tags,
                starred,
                archived,
                updated_at: now.clone(),
            },
        )?;
    }

    tx.commit()?;
    Ok(targets.len())
}

fn load_conversation(conn: &Connection, conversation_id: &str) -> Result<Option<Conversation>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM conversations WHERE conversation_id = ?",
            FULL_COLUMNS
        ),
        params![conversation_id],
        conversation_from_row,
    )
    .optional()
    .map_err(Into::into)
}

// ============================================
// ROW MAPPING
// ============================================

fn json_column<T: DeserializeOwned + Default>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(T::default()),
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
    }
}

fn summary_from_row(row: &Row) -> rusqlite::Result<ConversationSummary> {
    Ok(ConversationSummary {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        source: row.get(5)?,
        model: row.get(6)?,
        message_count: row.get::<_, i64>(7)? as usize,
        tags: json_column(row, 8)?,
        starred: row.get::<_, Option<bool>>(9)?.unwrap_or(false),
        archived: row.get::<_, Option<bool>>(10)?.unwrap_or(false),
    })
}

fn conversation_from_row(row: &Row) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        source: row.get(5)?,
        model: row.get(6)?,
        tags: json_column(row, 8)?,
        starred: row.get::<_, Option<bool>>(9)?.unwrap_or(false),
        archived: row.get::<_, Option<bool>>(10)?.unwrap_or(false),
        messages: json_column(row, 11)?,
        metadata: json_column(row, 12)?,
    })
}
