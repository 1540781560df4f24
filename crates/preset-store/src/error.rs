//! Error types for preset-store

use std::path::PathBuf;

/// Result type for preset-store operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Filesystem failure while discovering or reading document files
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A document file is not valid JSON (after comment stripping)
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A document file does not hold a JSON array of document objects
    #[error("Expected a JSON array of preset documents in {path}")]
    UnexpectedLayout { path: PathBuf },

    /// Resolution failure from the core
    #[error(transparent)]
    Core(#[from] preset_core::Error),
}
