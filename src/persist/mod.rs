//! Persistence layer
//!
//! The durable side of the store is a single table of rows, one per
//! variable, reached through the [`VariableBackend`] trait. The session
//! treats it as an opaque key-value service: it never sees how rows are kept,
//! only the row shape and the handful of operations below.
//!
//! Two reference backends ship with the crate:
//! - [`MemoryBackend`]: ordered in-memory rows, mainly for tests
//! - [`FileBackend`]: a JSON document written through on every mutation

pub mod file;
pub mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use serde::{Deserialize, Serialize};

use crate::codec::FormatVersion;
use crate::error::Result;

/// One persisted variable.
///
/// The value type is stored by qualified name rather than id so rows survive
/// catalog changes; `initial_value` is opaque bytes in whatever format the
/// active codec produces, or absent for a null value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRow {
    pub name: String,
    pub is_constant: bool,
    pub type_namespace: String,
    pub type_name: String,
    #[serde(with = "opaque_bytes")]
    pub initial_value: Option<Vec<u8>>,
}

/// Persistence service contract.
///
/// All operations are synchronous and complete or fail before returning;
/// failures surface as [`Persistence`](crate::error::Error::Persistence)
/// errors that the session maps to a rollback of the in-memory change.
pub trait VariableBackend {
    /// The schema format marker, inspected once at session bootstrap.
    fn format_version(&self) -> Result<FormatVersion>;

    /// Flips the schema format marker (the V1→V2 migration endpoint).
    fn set_format_version(&mut self, version: FormatVersion) -> Result<()>;

    /// Inserts a new row; a duplicate name is a persistence failure.
    fn insert_row(&mut self, row: &VariableRow) -> Result<()>;

    /// Replaces the stored value bytes of an existing row.
    fn update_initial_value(&mut self, name: &str, value: Option<&[u8]>) -> Result<()>;

    /// Deletes a row; deleting an absent row is a persistence failure.
    fn delete_row(&mut self, name: &str) -> Result<()>;

    /// All rows, ascending by name (byte-wise).
    fn select_all_ordered_by_name(&self) -> Result<Vec<VariableRow>>;
}

/// Serde helper rendering opaque value bytes as base64 text, so the file
/// backend's JSON stays inspectable.
mod opaque_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value
            .as_ref()
            .map(|bytes| STANDARD.encode(bytes))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_json_uses_base64_for_value_bytes() {
        let row = VariableRow {
            name: "x".to_string(),
            is_constant: false,
            type_namespace: "core".to_string(),
            type_name: "bytea".to_string(),
            initial_value: Some(vec![0xde, 0xad, 0xbe, 0xef]),
        };
        let json = serde_json::to_string(&row).unwrap();
        assert!(json.contains("3q2+7w==")); // base64 of deadbeef
        let back: VariableRow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn test_null_value_round_trips() {
        let row = VariableRow {
            name: "x".to_string(),
            is_constant: true,
            type_namespace: "core".to_string(),
            type_name: "int4".to_string(),
            initial_value: None,
        };
        let json = serde_json::to_string(&row).unwrap();
        let back: VariableRow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }
}
