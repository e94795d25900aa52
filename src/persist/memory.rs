//! In-memory backend for testing
//!
//! Keeps rows in an ordered map. Also offers write-failure injection so that
//! write-through rollback behavior can be exercised from tests.

use std::collections::BTreeMap;

use crate::codec::FormatVersion;
use crate::error::{Error, Result};

use super::{VariableBackend, VariableRow};

/// Ordered in-memory row table.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    rows: BTreeMap<String, VariableRow>,
    version: FormatVersion,
    fail_next_write: bool,
}

impl MemoryBackend {
    /// An empty table in the current format.
    pub fn new() -> Self {
        Self::with_version(FormatVersion::V2)
    }

    /// An empty table carrying the given schema marker, for legacy-format
    /// scenarios.
    pub fn with_version(version: FormatVersion) -> Self {
        Self {
            rows: BTreeMap::new(),
            version,
            fail_next_write: false,
        }
    }

    /// Number of rows stored.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Seeds a row directly, bypassing the session (for load scenarios).
    pub fn seed_row(&mut self, row: VariableRow) {
        self.rows.insert(row.name.clone(), row);
    }

    /// Direct row access for assertions.
    pub fn row(&self, name: &str) -> Option<&VariableRow> {
        self.rows.get(name)
    }

    /// Makes the next mutating call fail, once.
    pub fn fail_next_write(&mut self) {
        self.fail_next_write = true;
    }

    fn check_injected_failure(&mut self) -> Result<()> {
        if self.fail_next_write {
            self.fail_next_write = false;
            return Err(Error::Persistence("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableBackend for MemoryBackend {
    fn format_version(&self) -> Result<FormatVersion> {
        Ok(self.version)
    }

    fn set_format_version(&mut self, version: FormatVersion) -> Result<()> {
        self.version = version;
        Ok(())
    }

    fn insert_row(&mut self, row: &VariableRow) -> Result<()> {
        self.check_injected_failure()?;
        if self.rows.contains_key(&row.name) {
            return Err(Error::Persistence(format!(
                "duplicate row \"{}\"",
                row.name
            )));
        }
        self.rows.insert(row.name.clone(), row.clone());
        Ok(())
    }

    fn update_initial_value(&mut self, name: &str, value: Option<&[u8]>) -> Result<()> {
        self.check_injected_failure()?;
        let row = self
            .rows
            .get_mut(name)
            .ok_or_else(|| Error::Persistence(format!("no row \"{name}\"")))?;
        row.initial_value = value.map(<[u8]>::to_vec);
        Ok(())
    }

    fn delete_row(&mut self, name: &str) -> Result<()> {
        self.check_injected_failure()?;
        self.rows
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::Persistence(format!("no row \"{name}\"")))
    }

    fn select_all_ordered_by_name(&self) -> Result<Vec<VariableRow>> {
        Ok(self.rows.values().cloned().collect())
    }
}
