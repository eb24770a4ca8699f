//! Tag command implementations

use anyhow::{Context, Result};

use super::list::print_table;
use crate::error::ArchiveError;
use crate::model::{dedup_tags, MetadataUpdate};
use crate::store::ArchiveStore;

/// How `tags` combine with the tags a conversation already has
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagEdit {
    Set,
    Add,
    Remove,
}

pub fn edit(
    store: &mut ArchiveStore,
    conversation_id: &str,
    tags: &[String],
    mode: TagEdit,
) -> Result<()> {
    let current = store
        .get_conversation_by_id(conversation_id)?
        .ok_or_else(|| ArchiveError::not_found(conversation_id))?
        .tags;

    let tags = apply_edit(current, tags, mode);
    let updated = store
        .update_conversation_metadata(
            conversation_id,
            &MetadataUpdate {
                tags: Some(tags),
                ..Default::default()
            },
        )
        .with_context(|| format!("updating tags on {}", conversation_id))?;

    if updated.tags.is_empty() {
        println!("{}: no tags", conversation_id);
    } else {
        println!("{}: {}", conversation_id, updated.tags.join(", "));
    }
    Ok(())
}

fn apply_edit(current: Vec<String>, tags: &[String], mode: TagEdit) -> Vec<String> {
    match mode {
        TagEdit::Set => dedup_tags(tags.iter().cloned()),
        TagEdit::Add => dedup_tags(current.into_iter().chain(tags.iter().cloned())),
        TagEdit::Remove => current
            .into_iter()
            .filter(|t| !tags.iter().any(|r| r.trim() == t))
            .collect(),
    }
}

pub fn list(store: &ArchiveStore) -> Result<()> {
    let tags = store.get_all_tags()?;
    if tags.is_empty() {
        println!("No tags yet.");
        return Ok(());
    }

    println!("{:<30} {:>6}", "Tag", "Count");
    println!("{}", "-".repeat(37));
    for tag in tags {
        println!("{:<30} {:>6}", tag.tag, tag.count);
    }
    Ok(())
}

pub fn rename(store: &mut ArchiveStore, old: &str, new: &str) -> Result<()> {
    let touched = store.rename_tag(old, new)?;
    println!("Renamed '{}' → '{}' on {} conversations", old, new, touched);
    Ok(())
}

pub fn delete(store: &mut ArchiveStore, tag: &str) -> Result<()> {
    let touched = store.delete_tag(tag)?;
    println!("Removed '{}' from {} conversations", tag, touched);
    Ok(())
}

pub fn find(store: &ArchiveStore, tags: &[String], match_all: bool) -> Result<()> {
    let found = store.get_conversations_by_tags(tags, match_all)?;
    if found.is_empty() {
        println!("No conversations tagged {}.", tags.join(if match_all { " + " } else { " / " }));
        return Ok(());
    }
    print_table(&found);
    Ok(())
}
