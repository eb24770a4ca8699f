//! Star, archive, delete and clear

use anyhow::Result;

use crate::model::{BulkOutcome, MetadataUpdate};
use crate::store::ArchiveStore;

pub fn star(store: &mut ArchiveStore, ids: &[String], on: bool) -> Result<()> {
    let outcome = store.bulk_update_conversations(
        ids,
        &MetadataUpdate {
            starred: Some(on),
            ..Default::default()
        },
    )?;
    report(if on { "Starred" } else { "Unstarred" }, &outcome);
    Ok(())
}

pub fn archive(store: &mut ArchiveStore, ids: &[String], on: bool) -> Result<()> {
    let outcome = store.bulk_update_conversations(
        ids,
        &MetadataUpdate {
            archived: Some(on),
            ..Default::default()
        },
    )?;
    report(if on { "Archived" } else { "Unarchived" }, &outcome);
    Ok(())
}

pub fn delete(store: &mut ArchiveStore, ids: &[String]) -> Result<()> {
    let outcome = store.bulk_delete_conversations(ids)?;
    report("Deleted", &outcome);
    Ok(())
}

pub fn clear(store: &mut ArchiveStore, confirmed: bool) -> Result<()> {
    if !confirmed {
        println!("This removes every conversation. Re-run with --yes to confirm.");
        return Ok(());
    }
    let removed = store.clear_database()?;
    println!("Removed {} conversations.", removed);
    Ok(())
}

fn report(verb: &str, outcome: &BulkOutcome) {
    println!("{} {} conversations", verb, outcome.succeeded);
    for error in &outcome.errors {
        println!("   ✗ {}", error);
    }
}
