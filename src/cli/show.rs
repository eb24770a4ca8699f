//! Show command implementation

use anyhow::Result;

use crate::store::ArchiveStore;

pub fn run(store: &ArchiveStore, conversation_id: &str) -> Result<()> {
    let conversation = match store.get_conversation_by_id(conversation_id)? {
        Some(c) => c,
        None => {
            println!("Conversation '{}' not found.", conversation_id);
            return Ok(());
        }
    };

    println!("\n{}", "=".repeat(80));
    println!("{}", conversation.title);
    println!("ID: {}", conversation.conversation_id);
    println!(
        "Source: {} | Model: {}",
        conversation.source, conversation.model
    );
    println!(
        "Created: {} | Updated: {}",
        conversation.created_at, conversation.updated_at
    );
    if !conversation.tags.is_empty() {
        println!("Tags: {}", conversation.tags.join(", "));
    }
    if conversation.starred || conversation.archived {
        let mut flags = Vec::new();
        if conversation.starred {
            flags.push("starred");
        }
        if conversation.archived {
            flags.push("archived");
        }
        println!("Flags: {}", flags.join(", "));
    }
    println!("{}", "=".repeat(80));

    if conversation.messages.is_empty() {
        println!("\nNo messages in this conversation.");
        return Ok(());
    }

    for message in &conversation.messages {
        let model_info = message
            .metadata
            .get("model_slug")
            .or_else(|| message.metadata.get("model"))
            .and_then(|m| m.as_str())
            .map(|m| format!(" | {}", m))
            .unwrap_or_default();

        println!(
            "\n[{}{}] ({})",
            message.role.to_uppercase(),
            model_info,
            message.created_at
        );
        println!("{}", message.content);
        println!("{}", "-".repeat(40));
    }

    Ok(())
}
