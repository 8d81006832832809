//! Per-turn file baselines and the changes made against them.
//!
//! The first time a tool touches a path during a turn, the tracker records
//! that file's content (or its absence). [`DiffTracker::generate_changes`]
//! later compares every baseline against what is on disk now.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use similar::{Algorithm, TextDiff};

/// Lines of unchanged context around each hunk.
const CONTEXT_LINES: usize = 3;

/// One file's change over a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileChange {
    Add { content: String },
    Delete { content: String },
    Update { unified_diff: String },
}

/// Snapshot store for a single turn. Not shared across concurrent turns.
///
/// Keys are normalized paths: relative to the project root when the file
/// lives under it, absolute otherwise.
#[derive(Debug)]
pub struct DiffTracker {
    project_root: PathBuf,
    baselines: BTreeMap<PathBuf, Option<String>>,
}

impl DiffTracker {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: normalize_lexically(&project_root.into()),
            baselines: BTreeMap::new(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Record the current content of `path` unless it already has a baseline.
    ///
    /// First touch wins: once a tool has modified the file, a later snapshot
    /// must not replace the original state. Malformed paths are ignored.
    pub fn snapshot_file(&mut self, path: impl AsRef<Path>) {
        let Some(key) = self.normalize(path.as_ref()) else {
            tracing::debug!(path = %path.as_ref().display(), "Ignoring malformed path for snapshot");
            return;
        };
        if self.baselines.contains_key(&key) {
            return;
        }
        let content = self.read_content(&key);
        tracing::debug!(path = %key.display(), existed = content.is_some(), "Snapshotted file baseline");
        self.baselines.insert(key, content);
    }

    /// Whether `path` already has a baseline this turn.
    pub fn is_tracked(&self, path: impl AsRef<Path>) -> bool {
        self.normalize(path.as_ref())
            .is_some_and(|key| self.baselines.contains_key(&key))
    }

    /// Compare every baseline against the file's current content.
    ///
    /// Paths whose content is unchanged (including "still absent") produce
    /// no entry.
    pub fn generate_changes(&self) -> BTreeMap<PathBuf, FileChange> {
        let mut changes = BTreeMap::new();
        for (path, before) in &self.baselines {
            let after = self.read_content(path);
            let change = match (before, after) {
                (None, Some(after)) => FileChange::Add { content: after },
                (Some(before), None) => FileChange::Delete {
                    content: before.clone(),
                },
                (Some(before), Some(after)) if *before != after => FileChange::Update {
                    unified_diff: unified_diff(before, &after, path),
                },
                _ => continue,
            };
            changes.insert(path.clone(), change);
        }
        tracing::debug!(tracked = self.baselines.len(), changed = changes.len(), "Generated turn changes");
        changes
    }

    /// Drop all baselines. Call at the start of every turn.
    pub fn clear(&mut self) {
        self.baselines.clear();
    }

    fn normalize(&self, raw: &Path) -> Option<PathBuf> {
        let as_str = raw.to_str()?;
        if as_str.trim().is_empty() || as_str.contains('\0') {
            return None;
        }
        let absolute = normalize_lexically(&self.project_root.join(raw));
        match absolute.strip_prefix(&self.project_root) {
            Ok(relative) if !relative.as_os_str().is_empty() => Some(relative.to_path_buf()),
            Ok(_) => None,
            Err(_) => Some(absolute),
        }
    }

    /// Current content of a tracked key.
    ///
    /// A missing file, a non-regular file and an unreadable file all read as
    /// `None`. The last case hides real I/O errors behind "absent".
    fn read_content(&self, key: &Path) -> Option<String> {
        let resolved = self.project_root.join(key);
        match std::fs::metadata(&resolved) {
            Ok(meta) if meta.is_file() => std::fs::read_to_string(&resolved).ok(),
            _ => None,
        }
    }
}

/// Collapse `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let leading_parent =
                    matches!(out.components().next_back(), Some(Component::ParentDir));
                if leading_parent || out.as_os_str().is_empty() {
                    out.push("..");
                } else {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Split content into diff lines; a final newline does not start a new line.
fn diff_lines(content: &str) -> Vec<&str> {
    if content.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<&str> = content.split('\n').collect();
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

fn unified_diff(before: &str, after: &str, path: &Path) -> String {
    let old_lines = diff_lines(before);
    let new_lines = diff_lines(after);
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_slices(old_lines.as_slice(), new_lines.as_slice());

    let display = path.display();
    diff.unified_diff()
        .context_radius(CONTEXT_LINES)
        .missing_newline_hint(false)
        .header(&format!("a/{display}"), &format!("b/{display}"))
        .to_string()
        .trim_end_matches('\n')
        .to_string()
}
