//! Value representations.
//!
//! A [`Content`] is the raw payload of a value: either an inline scalar word
//! (fixed-width types up to [`INLINE_WIDTH`](super::INLINE_WIDTH) bytes) or an
//! owned byte buffer (wide and variable-length types). A [`TypedValue`] pairs
//! a payload with the type it is an instance of and is what callers hand in
//! and get back.
//!
//! [`StoredContent`] is the arena-owned form of a payload. It can only be
//! minted by the coercion engine's input path, which copies the payload out of
//! whatever transient scope it came from and validates it against the storage
//! type's width class. A call-scope `Content` never enters the store, and a
//! stored payload never leaves it, without that copy.

use crate::error::{Error, Result};

use super::{TypeId, WidthClass, INLINE_WIDTH};

/// Raw value payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Fixed-width scalar, held in the low bytes of a single word.
    Inline(u64),
    /// Owned buffer for wide fixed-size or variable-length payloads.
    Buffer(Box<[u8]>),
}

impl Content {
    pub fn from_bool(v: bool) -> Self {
        Content::Inline(v as u64)
    }

    pub fn from_i64(v: i64) -> Self {
        Content::Inline(v as u64)
    }

    pub fn from_f32(v: f32) -> Self {
        Content::Inline(v.to_bits() as u64)
    }

    pub fn from_f64(v: f64) -> Self {
        Content::Inline(v.to_bits())
    }

    pub fn from_bytes(v: impl Into<Box<[u8]>>) -> Self {
        Content::Buffer(v.into())
    }

    pub fn from_text(v: &str) -> Self {
        Content::Buffer(v.as_bytes().into())
    }

    /// The inline word, if this is a scalar.
    pub fn inline(&self) -> Option<u64> {
        match self {
            Content::Inline(w) => Some(*w),
            Content::Buffer(_) => None,
        }
    }

    /// The owned buffer, if this is one.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Content::Inline(_) => None,
            Content::Buffer(b) => Some(b),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.inline().map(|w| w != 0)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.inline().map(|w| w as i64)
    }

    pub fn as_f32(&self) -> Option<f32> {
        self.inline().map(|w| f32::from_bits(w as u32))
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.inline().map(f64::from_bits)
    }

    /// UTF-8 view of a buffer payload.
    pub fn as_str(&self) -> Option<&str> {
        self.bytes().and_then(|b| std::str::from_utf8(b).ok())
    }
}

/// A payload together with the type it is an instance of.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub ty: TypeId,
    pub datum: Content,
}

impl TypedValue {
    pub fn new(ty: TypeId, datum: Content) -> Self {
        Self { ty, datum }
    }
}

/// Arena-owned value payload.
///
/// Constructed only by [`adopt`](StoredContent::adopt) via the coercion
/// engine, which guarantees the payload was copied out of its transient scope
/// and matches the storage type's width classification.
#[derive(Debug, PartialEq)]
pub struct StoredContent(Content);

impl StoredContent {
    /// Takes ownership of `content` as arena content for a type of the given
    /// width class, validating the shape invariant.
    pub(crate) fn adopt(content: Content, width: WidthClass) -> Result<Self> {
        match (&content, width) {
            (Content::Inline(_), WidthClass::Fixed(n)) if n <= INLINE_WIDTH => {}
            (Content::Buffer(b), WidthClass::Wide(n)) if b.len() == n => {}
            (Content::Buffer(_), WidthClass::Variable) => {}
            _ => {
                return Err(Error::Internal(format!(
                    "content shape does not match width class {width}"
                )));
            }
        }
        Ok(StoredContent(content))
    }

    pub fn as_content(&self) -> &Content {
        &self.0
    }
}
