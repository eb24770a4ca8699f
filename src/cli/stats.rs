//! Stats command implementation

use anyhow::Result;

use crate::store::ArchiveStore;

pub fn run(store: &ArchiveStore, database: &std::path::Path) -> Result<()> {
    println!("Database: {}", database.display());
    println!("Schema version: {}", store.schema_version());
    println!("Conversations: {}", store.count_conversations()?);

    let sources = store.source_counts()?;
    if !sources.is_empty() {
        println!("\n{:<20} {:>8}", "Source", "Count");
        println!("{}", "-".repeat(29));
        for (source, count) in sources {
            println!("{:<20} {:>8}", source, count);
        }
    }

    let tags = store.get_all_tags()?;
    println!("\nDistinct tags: {}", tags.len());
    Ok(())
}
