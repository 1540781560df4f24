//! File-backed loading and persistence for preset registries
//!
//! `preset-store` is the thin front end between a directory of JSON preset
//! files and the resolution engine in `preset-core`: it discovers and parses
//! documents (tolerating `//` comment lines), feeds them to a registry, and
//! installs a [`JsonStore`] sink so registry mutations persist back to the
//! origin files.

pub mod error;
pub mod loader;
pub mod store;

pub use error::{Error, Result};
pub use loader::{LoadedDocument, load_documents, strip_comments};
pub use store::JsonStore;

use preset_core::Registry;
use std::path::Path;

/// Loads every document under `root` into a fresh registry with a
/// [`JsonStore`] attached.
pub fn open_registry(root: &Path) -> Result<Registry> {
    open(root, None)
}

/// Like [`open_registry`], but documents without a `base` implicitly inherit
/// the preset named `default_preset`.
pub fn open_registry_with_default(root: &Path, default_preset: &str) -> Result<Registry> {
    open(root, Some(default_preset))
}

fn open(root: &Path, default_preset: Option<&str>) -> Result<Registry> {
    let documents = load_documents(root)?;
    let mut registry = match default_preset {
        Some(name) => Registry::with_default_preset(name),
        None => Registry::new(),
    };
    registry.set_sink(Box::new(JsonStore::new(root)));
    registry.load(
        documents
            .into_iter()
            .map(|doc| (doc.data, Some(doc.file)))
            .collect(),
    )?;
    Ok(registry)
}
