//! Cache for instruction texts loaded from disk.
//!
//! Owned by whoever assembles prompts (usually the session) and passed in
//! explicitly. Each file is read at most once; later loads reuse the text.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::AgentError;

#[derive(Debug, Default)]
pub struct InstructionStore {
    cache: Mutex<HashMap<PathBuf, Arc<str>>>,
}

impl InstructionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the text at `path`, reading it on first use.
    ///
    /// # Errors
    ///
    /// [`AgentError::InstructionsNotFound`] if the file cannot be read.
    /// Failures are not cached, so a later call retries.
    pub fn load(&self, path: &Path) -> Result<Arc<str>, AgentError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(text) = cache.get(path) {
            return Ok(Arc::clone(text));
        }

        let text = std::fs::read_to_string(path).map_err(|_| AgentError::InstructionsNotFound {
            path: path.to_path_buf(),
        })?;
        tracing::debug!(path = %path.display(), bytes = text.len(), "Loaded instructions");

        let text: Arc<str> = Arc::from(text);
        cache.insert(path.to_path_buf(), Arc::clone(&text));
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_reads_once_then_reuses() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("INSTRUCTIONS.md");
        std::fs::write(&path, "Be concise.").unwrap();

        let store = InstructionStore::new();
        let first = store.load(&path).unwrap();

        // Changing the file does not affect the cached copy.
        std::fs::write(&path, "Be verbose.").unwrap();
        let second = store.load(&path).unwrap();

        assert_eq!(&*first, "Be concise.");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn load_missing_file_errors() {
        let tmp = TempDir::new().unwrap();
        let store = InstructionStore::new();
        match store.load(&tmp.path().join("missing.md")) {
            Err(AgentError::InstructionsNotFound { path }) => {
                assert!(path.ends_with("missing.md"));
            }
            other => panic!("Expected InstructionsNotFound, got: {other:?}"),
        }
    }
}
