//! Persisted-value codecs.
//!
//! Two formats exist for the `initial_value` bytes of a persisted row:
//!
//! - **V2 (current)**: the UTF-8 rendering produced by the type's to-text
//!   primitive. Self-describing and tolerant of minor width differences.
//! - **V1 (legacy)**: a raw capsule of the in-memory bit pattern. Kept only
//!   so that stores written by old sessions can still be read and migrated.
//!
//! The active codec is a single session-wide choice made once at bootstrap
//! from the backend's format marker; it is carried as an explicit tagged
//! value, not a global.
//!
//! V1 decoding validates the capsule length against the width the type
//! declares. A mismatch means the row was tampered with outside this code:
//! it is reported loudly and the row is skipped, never trusted.

use bytes::BufMut;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::types::{Content, StoredContent, TypeCatalog, TypeId, WidthClass};

/// Persisted schema format marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatVersion {
    V1,
    V2,
}

/// Tagged encode/decode dispatch for one format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    V1,
    V2,
}

impl Codec {
    pub fn for_version(version: FormatVersion) -> Self {
        match version {
            FormatVersion::V1 => Codec::V1,
            FormatVersion::V2 => Codec::V2,
        }
    }

    pub fn version(self) -> FormatVersion {
        match self {
            Codec::V1 => FormatVersion::V1,
            Codec::V2 => FormatVersion::V2,
        }
    }

    /// Serializes stored content into persisted bytes.
    pub fn encode(
        self,
        catalog: &dyn TypeCatalog,
        ty: TypeId,
        content: &StoredContent,
    ) -> Result<Vec<u8>> {
        match self {
            Codec::V1 => encode_v1(catalog, ty, content),
            Codec::V2 => encode_v2(catalog, ty, content),
        }
    }

    /// Deserializes persisted bytes back into a value payload.
    ///
    /// `name` is the owning variable's name, used for integrity reporting.
    pub fn decode(
        self,
        catalog: &dyn TypeCatalog,
        name: &str,
        ty: TypeId,
        raw: &[u8],
    ) -> Result<Content> {
        match self {
            Codec::V1 => decode_v1(catalog, name, ty, raw),
            Codec::V2 => decode_v2(catalog, name, ty, raw),
        }
    }
}

fn encode_v1(catalog: &dyn TypeCatalog, ty: TypeId, content: &StoredContent) -> Result<Vec<u8>> {
    let mut capsule = Vec::new();
    match (catalog.width_of(ty)?, content.as_content()) {
        (WidthClass::Fixed(_), Content::Inline(word)) => {
            // fixed scalars are written as the full word
            capsule.put_u64_le(*word);
        }
        (WidthClass::Wide(_), Content::Buffer(data)) => {
            capsule.put_slice(data);
        }
        (WidthClass::Variable, Content::Buffer(data)) => {
            // the capsule length prefix counts itself, like the payload it wraps
            capsule.put_u32_le(data.len() as u32 + 4);
            capsule.put_slice(data);
        }
        _ => {
            return Err(Error::Internal(format!(
                "stored content shape does not match the width of {}",
                catalog.display_name(ty)
            )));
        }
    }
    Ok(capsule)
}

fn decode_v1(catalog: &dyn TypeCatalog, name: &str, ty: TypeId, raw: &[u8]) -> Result<Content> {
    match catalog.width_of(ty)? {
        WidthClass::Fixed(_) => {
            if raw.len() != 8 {
                return Err(tampered(name, 8, raw.len()));
            }
            let mut word = [0u8; 8];
            word.copy_from_slice(raw);
            Ok(Content::Inline(u64::from_le_bytes(word)))
        }
        WidthClass::Wide(n) => {
            if raw.len() != n {
                return Err(tampered(name, n, raw.len()));
            }
            Ok(Content::from_bytes(raw.to_vec()))
        }
        WidthClass::Variable => {
            if raw.len() < 4 {
                return Err(tampered(name, 4, raw.len()));
            }
            let mut prefix = [0u8; 4];
            prefix.copy_from_slice(&raw[..4]);
            let declared = u32::from_le_bytes(prefix) as usize;
            if declared != raw.len() {
                return Err(tampered(name, declared, raw.len()));
            }
            Ok(Content::from_bytes(raw[4..].to_vec()))
        }
    }
}

/// The capsule length does not match what the type's width predicts. Someone
/// has altered the row behind our back; report loudly and refuse the value.
fn tampered(name: &str, expected: usize, actual: usize) -> Error {
    warn!(
        variable = name,
        expected, actual, "stored value has been tampered with, skipping row"
    );
    Error::CorruptRow(name.to_string())
}

fn encode_v2(catalog: &dyn TypeCatalog, ty: TypeId, content: &StoredContent) -> Result<Vec<u8>> {
    let io = catalog.text_io(ty)?;
    let rendered = (io.to_text)(content.as_content())?;
    Ok(rendered.into_bytes())
}

fn decode_v2(catalog: &dyn TypeCatalog, name: &str, ty: TypeId, raw: &[u8]) -> Result<Content> {
    let io = catalog.text_io(ty)?;
    let rendered = std::str::from_utf8(raw).map_err(|_| {
        warn!(variable = name, "stored value is not valid UTF-8, skipping row");
        Error::CorruptRow(name.to_string())
    })?;
    (io.from_text)(rendered).map_err(|_| {
        warn!(
            variable = name,
            value = rendered,
            "stored value does not parse as its declared type, skipping row"
        );
        Error::CorruptRow(name.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::coerce_input;
    use crate::types::BuiltinCatalog;

    fn stored(catalog: &BuiltinCatalog, ty: TypeId, content: Content) -> StoredContent {
        coerce_input(catalog, ty, &content, ty).unwrap()
    }

    #[test]
    fn test_v1_round_trip_fixed() {
        let catalog = BuiltinCatalog::new();
        let value = stored(&catalog, BuiltinCatalog::INT4, Content::from_i64(-123));
        let raw = Codec::V1
            .encode(&catalog, BuiltinCatalog::INT4, &value)
            .unwrap();
        assert_eq!(raw.len(), 8);
        let back = Codec::V1
            .decode(&catalog, "x", BuiltinCatalog::INT4, &raw)
            .unwrap();
        assert_eq!(back.as_i64(), Some(-123));
    }

    #[test]
    fn test_v1_round_trip_wide() {
        let catalog = BuiltinCatalog::new();
        let id = uuid::Uuid::new_v4();
        let value = stored(
            &catalog,
            BuiltinCatalog::UUID,
            Content::from_bytes(id.as_bytes().to_vec()),
        );
        let raw = Codec::V1
            .encode(&catalog, BuiltinCatalog::UUID, &value)
            .unwrap();
        assert_eq!(raw.len(), 16);
        let back = Codec::V1
            .decode(&catalog, "x", BuiltinCatalog::UUID, &raw)
            .unwrap();
        assert_eq!(back.bytes(), Some(&id.as_bytes()[..]));
    }

    #[test]
    fn test_v1_round_trip_variable() {
        let catalog = BuiltinCatalog::new();
        let value = stored(&catalog, BuiltinCatalog::TEXT, Content::from_text("hi"));
        let raw = Codec::V1
            .encode(&catalog, BuiltinCatalog::TEXT, &value)
            .unwrap();
        assert_eq!(raw.len(), 6); // 4-byte prefix + payload
        let back = Codec::V1
            .decode(&catalog, "x", BuiltinCatalog::TEXT, &raw)
            .unwrap();
        assert_eq!(back.as_str(), Some("hi"));
    }

    #[test]
    fn test_v1_detects_tampering() {
        let catalog = BuiltinCatalog::new();

        // truncated fixed capsule
        let err = Codec::V1
            .decode(&catalog, "x", BuiltinCatalog::INT4, &[1, 2, 3])
            .unwrap_err();
        assert!(matches!(err, Error::CorruptRow(_)));

        // wide capsule of the wrong length
        let err = Codec::V1
            .decode(&catalog, "x", BuiltinCatalog::UUID, &[0u8; 15])
            .unwrap_err();
        assert!(matches!(err, Error::CorruptRow(_)));

        // variable capsule whose prefix disagrees with its length
        let mut raw = Vec::new();
        raw.put_u32_le(99);
        raw.put_slice(b"hi");
        let err = Codec::V1
            .decode(&catalog, "x", BuiltinCatalog::TEXT, &raw)
            .unwrap_err();
        assert!(matches!(err, Error::CorruptRow(_)));
    }

    #[test]
    fn test_v2_round_trip() {
        let catalog = BuiltinCatalog::new();
        let value = stored(&catalog, BuiltinCatalog::FLOAT8, Content::from_f64(3.14));
        let raw = Codec::V2
            .encode(&catalog, BuiltinCatalog::FLOAT8, &value)
            .unwrap();
        assert_eq!(raw, b"3.14");
        let back = Codec::V2
            .decode(&catalog, "pi", BuiltinCatalog::FLOAT8, &raw)
            .unwrap();
        assert_eq!(back.as_f64(), Some(3.14));
    }

    #[test]
    fn test_v2_rejects_unparsable_text() {
        let catalog = BuiltinCatalog::new();
        let err = Codec::V2
            .decode(&catalog, "x", BuiltinCatalog::INT4, b"twelve")
            .unwrap_err();
        assert!(matches!(err, Error::CorruptRow(_)));
    }

    #[test]
    fn test_versions_map_to_codecs() {
        assert_eq!(Codec::for_version(FormatVersion::V1), Codec::V1);
        assert_eq!(Codec::for_version(FormatVersion::V2), Codec::V2);
        assert_eq!(Codec::V2.version(), FormatVersion::V2);
    }
}
