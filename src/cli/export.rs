//! Export command implementation

use anyhow::{Context, Result};
use std::path::Path;

use crate::export::build_envelope;
use crate::store::ArchiveStore;

pub fn run(store: &ArchiveStore, path: &Path, pretty: bool) -> Result<()> {
    let envelope = build_envelope(store.all_conversations()?);

    let json = if pretty {
        serde_json::to_string_pretty(&envelope)?
    } else {
        serde_json::to_string(&envelope)?
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;

    println!(
        "Exported {} conversations to {}",
        envelope.conversation_count,
        path.display()
    );
    Ok(())
}
