//! Value coercion engine.
//!
//! Converts a value from one type to another by the cheapest available path:
//!
//! 1. identity, when source and target are the same type (the payload is
//!    still copied, never aliased),
//! 2. a direct conversion function registered in the catalog,
//! 3. a textual round trip through the source's to-text and the target's
//!    from-text primitives.
//!
//! [`coerce_input`] produces storage-bound values and is the only place a
//! [`StoredContent`] can be minted; [`coerce_output`] produces plain
//! call-scope [`Content`] for callers. Values headed for the store are
//! copied into independently-owned buffers and validated against the storage
//! type's width class; values headed for a caller belong to that caller's
//! scope.

use tracing::trace;

use crate::error::{Error, Result};
use crate::types::{Content, StoredContent, TypeCatalog, TypeId};

/// Coerces `datum` from `source` into the storage form of `target`.
pub fn coerce_input(
    catalog: &dyn TypeCatalog,
    source: TypeId,
    datum: &Content,
    target: TypeId,
) -> Result<StoredContent> {
    let width = catalog.width_of(target)?;
    let converted = convert(catalog, source, datum, target)?;
    StoredContent::adopt(converted, width)
}

/// Coerces the stored `datum` of a `source`-typed entry into a caller value
/// of type `target`.
pub fn coerce_output(
    catalog: &dyn TypeCatalog,
    source: TypeId,
    datum: &StoredContent,
    target: TypeId,
) -> Result<Content> {
    convert(catalog, source, datum.as_content(), target)
}

fn convert(
    catalog: &dyn TypeCatalog,
    source: TypeId,
    datum: &Content,
    target: TypeId,
) -> Result<Content> {
    if source == target {
        trace!(%source, "coercion: identity");
        return Ok(datum.clone());
    }

    if let Some(conv) = catalog.direct_conversion(source, target) {
        trace!(%source, %target, "coercion: direct function");
        return conv(datum);
    }

    trace!(%source, %target, "coercion: text round trip");
    let source_io = catalog
        .text_io(source)
        .map_err(|_| no_path(catalog, source, target))?;
    let target_io = catalog
        .text_io(target)
        .map_err(|_| no_path(catalog, source, target))?;
    let rendered = (source_io.to_text)(datum)?;
    (target_io.from_text)(&rendered).map_err(|_| no_path(catalog, source, target))
}

fn no_path(catalog: &dyn TypeCatalog, source: TypeId, target: TypeId) -> Error {
    Error::CoercionFailed {
        from: catalog.display_name(source),
        to: catalog.display_name(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BuiltinCatalog;

    #[test]
    fn test_identity_copies_the_buffer() {
        let catalog = BuiltinCatalog::new();
        let source = Content::from_text("alpha");
        let stored = coerce_input(
            &catalog,
            BuiltinCatalog::TEXT,
            &source,
            BuiltinCatalog::TEXT,
        )
        .unwrap();

        // dropping the call-scope value leaves the stored copy intact
        drop(source);
        assert_eq!(stored.as_content().as_str(), Some("alpha"));
    }

    #[test]
    fn test_direct_function_path() {
        let catalog = BuiltinCatalog::new();
        let stored = coerce_input(
            &catalog,
            BuiltinCatalog::INT2,
            &Content::from_i64(12),
            BuiltinCatalog::INT8,
        )
        .unwrap();
        assert_eq!(stored.as_content().as_i64(), Some(12));
    }

    #[test]
    fn test_text_round_trip_path() {
        let catalog = BuiltinCatalog::new();
        // no direct function between int4 and text
        let stored = coerce_input(
            &catalog,
            BuiltinCatalog::INT4,
            &Content::from_i64(42),
            BuiltinCatalog::TEXT,
        )
        .unwrap();
        assert_eq!(stored.as_content().as_str(), Some("42"));

        let back = coerce_output(&catalog, BuiltinCatalog::TEXT, &stored, BuiltinCatalog::INT4)
            .unwrap();
        assert_eq!(back.as_i64(), Some(42));
    }

    #[test]
    fn test_unparsable_round_trip_fails() {
        let catalog = BuiltinCatalog::new();
        let err = coerce_input(
            &catalog,
            BuiltinCatalog::TEXT,
            &Content::from_text("not a number"),
            BuiltinCatalog::INT4,
        )
        .unwrap_err();
        assert!(matches!(err, Error::CoercionFailed { .. }));
    }

    #[test]
    fn test_narrowing_out_of_range_fails() {
        let catalog = BuiltinCatalog::new();
        let err = coerce_input(
            &catalog,
            BuiltinCatalog::INT8,
            &Content::from_i64(i64::MAX),
            BuiltinCatalog::INT4,
        )
        .unwrap_err();
        assert!(matches!(err, Error::CoercionFailed { .. }));
    }

    #[test]
    fn test_output_lands_in_requested_type() {
        let catalog = BuiltinCatalog::new();
        let stored = coerce_input(
            &catalog,
            BuiltinCatalog::INT4,
            &Content::from_i64(5),
            BuiltinCatalog::INT4,
        )
        .unwrap();
        let out = coerce_output(&catalog, BuiltinCatalog::INT4, &stored, BuiltinCatalog::FLOAT8)
            .unwrap();
        assert_eq!(out.as_f64(), Some(5.0));
    }
}
