//! Command implementations for the `convokeep` binary

pub mod export;
pub mod import;
pub mod list;
pub mod mutate;
pub mod show;
pub mod stats;
pub mod tag;

/// Shorten a title to `max` characters for table output
pub(crate) fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

/// `2024-03-05T14:22:10.000Z` -> `2024-03-05 14:22`
pub(crate) fn short_timestamp(ts: &str) -> String {
    match (ts.get(..10), ts.get(11..16)) {
        (Some(date), Some(time)) => format!("{} {}", date, time),
        _ => ts.to_string(),
    }
}
