//! File and line statistics for a turn's change set.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use super::tracker::FileChange;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub file_count: usize,
    pub added_lines: usize,
    pub removed_lines: usize,
}

/// Count files and added/removed lines across a change set.
pub fn calculate_diff_stats(changes: &BTreeMap<PathBuf, FileChange>) -> DiffStats {
    let mut stats = DiffStats {
        file_count: changes.len(),
        ..Default::default()
    };

    for change in changes.values() {
        match change {
            FileChange::Add { content } => stats.added_lines += count_lines(content),
            FileChange::Delete { content } => stats.removed_lines += count_lines(content),
            FileChange::Update { unified_diff } => {
                for line in unified_diff.lines() {
                    // File headers
                    if line.starts_with("+++") || line.starts_with("---") {
                        continue;
                    }
                    if line.starts_with('+') {
                        stats.added_lines += 1;
                    } else if line.starts_with('-') {
                        stats.removed_lines += 1;
                    }
                }
            }
        }
    }

    stats
}

/// One-line summary such as `Edited 2 files (+10 -3)`.
pub fn format_diff_summary(changes: &BTreeMap<PathBuf, FileChange>) -> String {
    if changes.is_empty() {
        return "No file changes.".to_string();
    }
    let stats = calculate_diff_stats(changes);
    let label = if stats.file_count == 1 { "file" } else { "files" };
    format!(
        "Edited {} {label} (+{} -{})",
        stats.file_count, stats.added_lines, stats.removed_lines
    )
}

/// Lines in raw file content. A trailing newline does not add a line.
pub fn count_lines(content: &str) -> usize {
    if content.is_empty() {
        return 0;
    }
    let parts = content.split('\n').count();
    if content.ends_with('\n') { parts - 1 } else { parts }
}
