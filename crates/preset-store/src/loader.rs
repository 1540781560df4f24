//! JSON preset document loading
//!
//! Documents live in `*.json` files anywhere under a root directory, one
//! JSON array of document objects per file:
//!
//! ```text
//! config/
//!   defaults.json
//!   trials/
//!     batch-size-sweep.json
//! ```
//!
//! A line whose content after leading whitespace starts with `//` is treated
//! as blank, so files may carry comments despite JSON. Stripping preserves
//! line numbers, keeping parse error locations meaningful.

use crate::{Error, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// A raw document together with the file it came from, relative to the root.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub data: Map<String, Value>,
    pub file: String,
}

/// Loads every document under `root`, in deterministic (sorted-path) file
/// order, preserving document order within each file. A missing root yields
/// an empty list.
pub fn load_documents(root: &Path) -> Result<Vec<LoadedDocument>> {
    let mut files = Vec::new();
    collect_json_files(root, &mut files)?;
    files.sort();

    let mut documents = Vec::new();
    for path in files {
        let content = fs::read_to_string(&path)?;
        let parsed: Value =
            serde_json::from_str(&strip_comments(&content)).map_err(|source| Error::Parse {
                path: path.clone(),
                source,
            })?;
        let Value::Array(entries) = parsed else {
            return Err(Error::UnexpectedLayout { path });
        };

        let file = relative_name(root, &path);
        tracing::debug!("Loading {} documents from {}", entries.len(), file);
        for entry in entries {
            let Value::Object(data) = entry else {
                return Err(Error::UnexpectedLayout { path });
            };
            documents.push(LoadedDocument {
                data,
                file: file.clone(),
            });
        }
    }
    Ok(documents)
}

/// Blanks out `//` comment lines while keeping the line count intact.
pub fn strip_comments(content: &str) -> String {
    content
        .lines()
        .map(|line| {
            if line.trim_start().starts_with("//") {
                ""
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(())
}

fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn strip_comments_blanks_only_comment_lines() {
        let content = "[\n  // a comment\n  { \"a\": 1 },\n     // indented comment\n  { \"b\": \"url://not-a-comment\" }\n]";
        let stripped = strip_comments(content);

        assert_eq!(stripped.lines().count(), content.lines().count());
        let parsed: Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(parsed[1]["b"], json!("url://not-a-comment"));
    }

    #[test]
    fn load_from_missing_root_yields_nothing() {
        let documents = load_documents(Path::new("/nonexistent/presets")).unwrap();
        assert!(documents.is_empty());
    }

    #[test]
    fn load_discovers_nested_files_with_relative_names() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("trials")).unwrap();
        fs::write(
            temp.path().join("defaults.json"),
            r#"[{ "uuid": "default", "config": { "seed": 1 } }]"#,
        )
        .unwrap();
        fs::write(
            temp.path().join("trials/sweep.json"),
            "[\n  // the sweep\n  { \"uuid\": \"sweep\", \"config\": {} }\n]",
        )
        .unwrap();

        let documents = load_documents(temp.path()).unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].file, "defaults.json");
        assert_eq!(documents[0].data["uuid"], json!("default"));
        assert_eq!(documents[1].file, "trials/sweep.json");
    }

    #[test]
    fn non_array_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("bad.json"), r#"{ "uuid": "x" }"#).unwrap();

        assert!(matches!(
            load_documents(temp.path()),
            Err(Error::UnexpectedLayout { .. })
        ));
    }

    #[test]
    fn malformed_json_reports_the_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("broken.json"), "[ { ").unwrap();

        let error = load_documents(temp.path()).unwrap_err();
        assert!(error.to_string().contains("broken.json"));
    }
}
