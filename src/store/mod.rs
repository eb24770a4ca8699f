//! Conversation archive storage with SQLite
//!
//! `ArchiveStore` is the entry point: opening it runs schema creation and
//! migrations exactly once, after which every call delegates to the
//! repository with the owned connection.

mod connector;
mod repository;
mod schema;

pub use connector::StorageConnector;
pub use repository::{ConversationRepository, DEFAULT_BATCH_SIZE};
pub use schema::SCHEMA_VERSION;

use serde_json::Value;
use std::path::Path;

use crate::convert::ConversionPipeline;
use crate::error::Result;
use crate::model::{
    BulkOutcome, Conversation, ConversationFilter, ConversationSummary, MetadataUpdate, Page,
    StoreReport, TagCount,
};

pub struct ArchiveStore {
    connector: StorageConnector,
    repository: ConversationRepository,
}

impl ArchiveStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            connector: StorageConnector::open(path)?,
            repository: ConversationRepository::default(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            connector: StorageConnector::open_in_memory()?,
            repository: ConversationRepository::default(),
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.repository = self.repository.with_batch_size(batch_size);
        self
    }

    pub fn with_pipeline(mut self, pipeline: ConversionPipeline) -> Self {
        self.repository = self.repository.with_pipeline(pipeline);
        self
    }

    pub fn schema_version(&self) -> u32 {
        self.connector.schema_version()
    }

    pub fn pipeline(&self) -> &ConversionPipeline {
        self.repository.pipeline()
    }

    // ============================================
    // INGESTION
    // ============================================

    pub fn store_conversations(&mut self, raw: &Value) -> Result<StoreReport> {
        self.store_conversations_with_progress(raw, |_, _| {})
    }

    pub fn store_conversations_with_progress<F>(
        &mut self,
        raw: &Value,
        on_progress: F,
    ) -> Result<StoreReport>
    where
        F: FnMut(usize, usize),
    {
        self.repository
            .store_conversations(self.connector.connection_mut(), raw, on_progress)
    }

    pub fn store_records(&mut self, records: &[Conversation]) -> Result<StoreReport> {
        self.repository
            .store_records(self.connector.connection_mut(), records, |_, _| {})
    }

    // ============================================
    // QUERIES
    // ============================================

    pub fn get_conversations(&self, filter: &ConversationFilter) -> Result<Page> {
        self.repository
            .get_conversations(self.connector.connection(), filter)
    }

    pub fn get_conversation_by_id(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        self.repository
            .get_conversation_by_id(self.connector.connection(), conversation_id)
    }

    pub fn has_conversations(&self) -> Result<bool> {
        self.repository.has_conversations(self.connector.connection())
    }

    pub fn count_conversations(&self) -> Result<usize> {
        self.repository
            .count_conversations(self.connector.connection())
    }

    pub fn all_conversations(&self) -> Result<Vec<Conversation>> {
        self.repository.all_conversations(self.connector.connection())
    }

    pub fn source_counts(&self) -> Result<Vec<(String, usize)>> {
        self.repository.source_counts(self.connector.connection())
    }

    // ============================================
    // MUTATIONS
    // ============================================

    pub fn update_conversation_metadata(
        &mut self,
        conversation_id: &str,
        update: &MetadataUpdate,
    ) -> Result<Conversation> {
        self.repository.update_conversation_metadata(
            self.connector.connection_mut(),
            conversation_id,
            update,
        )
    }

    pub fn bulk_update_conversations(
        &mut self,
        conversation_ids: &[String],
        update: &MetadataUpdate,
    ) -> Result<BulkOutcome> {
        self.repository.bulk_update_conversations(
            self.connector.connection_mut(),
            conversation_ids,
            update,
        )
    }

    pub fn bulk_delete_conversations(&mut self, conversation_ids: &[String]) -> Result<BulkOutcome> {
        self.repository
            .bulk_delete_conversations(self.connector.connection_mut(), conversation_ids)
    }

    pub fn clear_database(&mut self) -> Result<usize> {
        self.repository
            .clear_database(self.connector.connection_mut())
    }

    // ============================================
    // TAGS
    // ============================================

    pub fn get_conversations_by_tags(
        &self,
        tags: &[String],
        match_all: bool,
    ) -> Result<Vec<ConversationSummary>> {
        self.repository
            .get_conversations_by_tags(self.connector.connection(), tags, match_all)
    }

    pub fn get_all_tags(&self) -> Result<Vec<TagCount>> {
        self.repository.get_all_tags(self.connector.connection())
    }

    pub fn rename_tag(&mut self, old: &str, new: &str) -> Result<usize> {
        self.repository
            .rename_tag(self.connector.connection_mut(), old, new)
    }

    pub fn delete_tag(&mut self, tag: &str) -> Result<usize> {
        self.repository
            .delete_tag(self.connector.connection_mut(), tag)
    }
}

#[cfg(test)]
mod tests;
