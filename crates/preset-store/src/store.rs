//! Persistence sink writing documents back to their origin files
//!
//! The registry hands the sink every document belonging to one origin file,
//! in load order; the sink renders them as a pretty-printed JSON array.
//! serde_json keeps object keys sorted, so rewrites are stable and diffs
//! stay small.

use preset_core::DocumentSink;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Writes preset documents as JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

impl DocumentSink for JsonStore {
    fn save(&self, file: &str, documents: &[Value]) -> preset_core::Result<()> {
        let path = self.root.join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let rendered = serde_json::to_string_pretty(documents)
            .map_err(|source| io::Error::new(io::ErrorKind::InvalidData, source))?;
        fs::write(path, rendered + "\n")?;
        Ok(())
    }
}
