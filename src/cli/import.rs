//! Import command implementation

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::export;
use crate::model::StoreReport;
use crate::store::ArchiveStore;

pub fn run(store: &mut ArchiveStore, inputs: &[String]) -> Result<()> {
    let files = collect_files(inputs)?;
    if files.is_empty() {
        println!("No JSON files found.");
        return Ok(());
    }

    let summary = import_all(store, &files);
    println!(
        "\n✅ Imported {} of {} files: {} new, {} updated, {} failed records",
        files.len() - summary.failed_files.len(),
        files.len(),
        summary.totals.new_conversations,
        summary.totals.updated_conversations,
        summary.totals.failed.len()
    );
    for (path, error) in &summary.failed_files {
        println!("   ✗ {}: {}", path.display(), error);
    }
    Ok(())
}

/// Aggregate over every imported file; unreadable files are listed, not fatal
#[derive(Debug, Default)]
pub struct ImportSummary {
    pub totals: StoreReport,
    pub failed_files: Vec<(PathBuf, String)>,
}

pub fn import_all(store: &mut ArchiveStore, files: &[PathBuf]) -> ImportSummary {
    let mut summary = ImportSummary::default();

    for file in files {
        print!("→ {} ", file.display());
        let report = match import_file(store, file) {
            Ok(report) => report,
            Err(e) => {
                warn!(path = %file.display(), error = %e, "skipping file");
                println!("(failed: {:#})", e);
                summary.failed_files.push((file.clone(), format!("{:#}", e)));
                continue;
            }
        };

        println!(
            "({} new, {} updated, {} failed)",
            report.new_conversations,
            report.updated_conversations,
            report.failed.len()
        );
        for failure in &report.failed {
            println!("   ✗ record {}: {}", failure.index, failure.error);
        }

        summary.totals.new_conversations += report.new_conversations;
        summary.totals.updated_conversations += report.updated_conversations;
        summary.totals.failed.extend(report.failed);
    }

    summary
}

pub fn import_file(store: &mut ArchiveStore, path: &Path) -> Result<StoreReport> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let raw: Value =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;

    let raw = if export::is_envelope(&raw) {
        debug!(path = %path.display(), "unwrapping export envelope");
        export::parse_envelope(&raw).with_context(|| format!("importing {}", path.display()))?
    } else {
        raw
    };

    let report = store
        .store_conversations_with_progress(&raw, |done, total| {
            debug!(done, total, "import progress");
        })
        .with_context(|| format!("storing {}", path.display()))?;
    Ok(report)
}

/// Expand every input to concrete files: directories are walked for
/// `*.json`, anything that is not an existing path is tried as a glob
pub fn collect_files(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        let expanded = shellexpand::tilde(input).to_string();
        let path = PathBuf::from(&expanded);

        if path.is_dir() {
            for entry in WalkDir::new(&path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() && is_json(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            files.push(path);
        } else {
            let matches = glob::glob(&expanded)
                .with_context(|| format!("invalid pattern {}", input))?
                .filter_map(|p| p.ok())
                .filter(|p| p.is_file())
                .collect::<Vec<_>>();
            if matches.is_empty() {
                warn!(input = %input, "nothing matched");
            }
            files.extend(matches);
        }
    }

    files.dedup();
    Ok(files)
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}
