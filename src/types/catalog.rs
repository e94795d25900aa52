//! Type catalog trait - the external type-metadata contract.

use crate::error::Result;

use super::{Content, TypeId, WidthClass};

/// Direct conversion function between two concrete types.
///
/// Implementations report their own [`CoercionFailed`](crate::error::Error)
/// when the value is out of range for the target.
pub type ConvFn = fn(&Content) -> Result<Content>;

/// Text primitives of a type.
#[derive(Clone, Copy)]
pub struct TextIo {
    pub to_text: fn(&Content) -> Result<String>,
    pub from_text: fn(&str) -> Result<Content>,
}

/// Answers "what is this type's storage width, and how do I convert it".
///
/// The store consumes this service; it never inspects type internals itself.
/// Pseudo types (types with no concrete runtime representation) must be
/// reported through [`is_pseudo`](TypeCatalog::is_pseudo) so the store can
/// reject them before any entry referencing them is created.
pub trait TypeCatalog {
    /// Resolves a type by qualified name.
    fn lookup(&self, namespace: &str, name: &str) -> Option<TypeId>;

    /// `(namespace, name)` of a type id.
    fn name_of(&self, ty: TypeId) -> Option<(&str, &str)>;

    /// Storage width classification.
    fn width_of(&self, ty: TypeId) -> Result<WidthClass>;

    /// Whether the type has no concrete runtime representation.
    fn is_pseudo(&self, ty: TypeId) -> bool;

    /// to-text / from-text primitives.
    fn text_io(&self, ty: TypeId) -> Result<TextIo>;

    /// Direct conversion function between two types, if one is registered.
    fn direct_conversion(&self, from: TypeId, to: TypeId) -> Option<ConvFn>;

    /// Display name used in error messages.
    fn display_name(&self, ty: TypeId) -> String {
        match self.name_of(ty) {
            Some((ns, name)) => format!("{ns}.{name}"),
            None => ty.to_string(),
        }
    }
}
