//! List command implementation

use anyhow::Result;

use super::{short_timestamp, truncate};
use crate::model::{ConversationFilter, ConversationSummary};
use crate::store::ArchiveStore;

pub fn run(store: &ArchiveStore, filter: &ConversationFilter) -> Result<()> {
    let page = store.get_conversations(filter)?;

    if filter.count_only {
        println!("{}", page.total);
        return Ok(());
    }

    if page.items.is_empty() {
        if page.total == 0 && !store.has_conversations()? {
            println!("No conversations found. Run 'convokeep import' first.");
        } else {
            println!("No conversations match ({} total).", page.total);
        }
        return Ok(());
    }

    print_table(&page.items);
    println!(
        "\nShowing {}-{} of {} ({})",
        filter.offset + 1,
        filter.offset + page.items.len(),
        page.total,
        filter.sort
    );

    Ok(())
}

pub fn print_table(items: &[ConversationSummary]) {
    println!(
        "{:<17} {:<38} {:<10} {:<16} {:>5}  {}",
        "Created", "ID", "Source", "Model", "Msgs", "Title"
    );
    println!("{}", "-".repeat(110));

    for summary in items {
        let mut flags = String::new();
        if summary.starred {
            flags.push('★');
        }
        if summary.archived {
            flags.push('▣');
        }

        println!(
            "{:<17} {:<38} {:<10} {:<16} {:>5}  {}{}{}",
            short_timestamp(&summary.created_at),
            truncate(&summary.conversation_id, 38),
            truncate(&summary.source, 10),
            truncate(&summary.model, 16),
            summary.message_count,
            flags,
            if flags.is_empty() { "" } else { " " },
            truncate(&summary.title, 40),
        );
    }
}
