//! File-backed backend.
//!
//! Persists the whole table as one JSON document and rewrites it on every
//! mutation. The table holds one row per session variable, so whole-document
//! writes stay small, and a single document keeps the format marker and the
//! rows atomic with each other.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::FormatVersion;
use crate::error::{Error, Result};

use super::{VariableBackend, VariableRow};

#[derive(Debug, Serialize, Deserialize)]
struct FileDocument {
    version: FormatVersion,
    rows: BTreeMap<String, VariableRow>,
}

/// JSON-document row table.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    doc: FileDocument,
}

impl FileBackend {
    /// Opens the document at `path`, creating an empty current-format table
    /// if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let doc = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| Error::Persistence(format!("read {}: {e}", path.display())))?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::Persistence(format!("parse {}: {e}", path.display())))?
        } else {
            debug!(path = %path.display(), "starting a fresh variables file");
            FileDocument {
                version: FormatVersion::V2,
                rows: BTreeMap::new(),
            }
        };
        Ok(Self { path, doc })
    }

    fn flush(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.doc)
            .map_err(|e| Error::Persistence(format!("serialize rows: {e}")))?;
        fs::write(&self.path, raw)
            .map_err(|e| Error::Persistence(format!("write {}: {e}", self.path.display())))
    }
}

impl VariableBackend for FileBackend {
    fn format_version(&self) -> Result<FormatVersion> {
        Ok(self.doc.version)
    }

    fn set_format_version(&mut self, version: FormatVersion) -> Result<()> {
        self.doc.version = version;
        self.flush()
    }

    fn insert_row(&mut self, row: &VariableRow) -> Result<()> {
        if self.doc.rows.contains_key(&row.name) {
            return Err(Error::Persistence(format!(
                "duplicate row \"{}\"",
                row.name
            )));
        }
        self.doc.rows.insert(row.name.clone(), row.clone());
        self.flush()
    }

    fn update_initial_value(&mut self, name: &str, value: Option<&[u8]>) -> Result<()> {
        let row = self
            .doc
            .rows
            .get_mut(name)
            .ok_or_else(|| Error::Persistence(format!("no row \"{name}\"")))?;
        row.initial_value = value.map(<[u8]>::to_vec);
        self.flush()
    }

    fn delete_row(&mut self, name: &str) -> Result<()> {
        self.doc
            .rows
            .remove(name)
            .ok_or_else(|| Error::Persistence(format!("no row \"{name}\"")))?;
        self.flush()
    }

    fn select_all_ordered_by_name(&self) -> Result<Vec<VariableRow>> {
        Ok(self.doc.rows.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, value: Option<&[u8]>) -> VariableRow {
        VariableRow {
            name: name.to_string(),
            is_constant: false,
            type_namespace: "core".to_string(),
            type_name: "text".to_string(),
            initial_value: value.map(<[u8]>::to_vec),
        }
    }

    #[test]
    fn test_missing_file_starts_empty_current_format() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path().join("vars.json")).unwrap();
        assert_eq!(backend.format_version().unwrap(), FormatVersion::V2);
        assert!(backend.select_all_ordered_by_name().unwrap().is_empty());
    }

    #[test]
    fn test_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vars.json");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.insert_row(&row("b", Some(b"two"))).unwrap();
        backend.insert_row(&row("a", Some(b"one"))).unwrap();
        backend.set_format_version(FormatVersion::V1).unwrap();
        drop(backend);

        let reopened = FileBackend::open(&path).unwrap();
        assert_eq!(reopened.format_version().unwrap(), FormatVersion::V1);
        let rows = reopened.select_all_ordered_by_name().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "a");
        assert_eq!(rows[1].name, "b");
        assert_eq!(rows[0].initial_value.as_deref(), Some(&b"one"[..]));
    }

    #[test]
    fn test_update_and_delete_write_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vars.json");

        let mut backend = FileBackend::open(&path).unwrap();
        backend.insert_row(&row("x", None)).unwrap();
        backend.update_initial_value("x", Some(b"now")).unwrap();

        let reopened = FileBackend::open(&path).unwrap();
        let rows = reopened.select_all_ordered_by_name().unwrap();
        assert_eq!(rows[0].initial_value.as_deref(), Some(&b"now"[..]));

        let mut backend = FileBackend::open(&path).unwrap();
        backend.delete_row("x").unwrap();
        let reopened = FileBackend::open(&path).unwrap();
        assert!(reopened.select_all_ordered_by_name().unwrap().is_empty());
    }
}
