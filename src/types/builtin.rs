//! Built-in type catalog.
//!
//! The reference [`TypeCatalog`] implementation. It carries the concrete
//! scalar and variable-length types the store is normally used with, their
//! text primitives, and the direct conversion lattice between the numeric
//! types. Two pseudo types (`any`, `record`) exist only so that callers can
//! observe them being rejected.

use std::fmt::Write as _;

use uuid::Uuid;

use crate::error::{Error, Result};

use super::catalog::{ConvFn, TextIo, TypeCatalog};
use super::{Content, TypeId, WidthClass};

/// Namespace all built-in types live in.
pub const CORE_NAMESPACE: &str = "core";

struct BuiltinType {
    name: &'static str,
    width: WidthClass,
    pseudo: bool,
    io: Option<TextIo>,
}

static TYPES: [BuiltinType; 11] = [
    BuiltinType {
        name: "bool",
        width: WidthClass::Fixed(1),
        pseudo: false,
        io: Some(TextIo { to_text: bool_out, from_text: bool_in }),
    },
    BuiltinType {
        name: "int2",
        width: WidthClass::Fixed(2),
        pseudo: false,
        io: Some(TextIo { to_text: int_out, from_text: int2_in }),
    },
    BuiltinType {
        name: "int4",
        width: WidthClass::Fixed(4),
        pseudo: false,
        io: Some(TextIo { to_text: int_out, from_text: int4_in }),
    },
    BuiltinType {
        name: "int8",
        width: WidthClass::Fixed(8),
        pseudo: false,
        io: Some(TextIo { to_text: int_out, from_text: int8_in }),
    },
    BuiltinType {
        name: "float4",
        width: WidthClass::Fixed(4),
        pseudo: false,
        io: Some(TextIo { to_text: float4_out, from_text: float4_in }),
    },
    BuiltinType {
        name: "float8",
        width: WidthClass::Fixed(8),
        pseudo: false,
        io: Some(TextIo { to_text: float8_out, from_text: float8_in }),
    },
    BuiltinType {
        name: "text",
        width: WidthClass::Variable,
        pseudo: false,
        io: Some(TextIo { to_text: text_out, from_text: text_in }),
    },
    BuiltinType {
        name: "bytea",
        width: WidthClass::Variable,
        pseudo: false,
        io: Some(TextIo { to_text: bytea_out, from_text: bytea_in }),
    },
    BuiltinType {
        name: "uuid",
        width: WidthClass::Wide(16),
        pseudo: false,
        io: Some(TextIo { to_text: uuid_out, from_text: uuid_in }),
    },
    BuiltinType { name: "any", width: WidthClass::Variable, pseudo: true, io: None },
    BuiltinType { name: "record", width: WidthClass::Variable, pseudo: true, io: None },
];

/// The built-in type catalog.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinCatalog;

impl BuiltinCatalog {
    pub const BOOL: TypeId = TypeId(0);
    pub const INT2: TypeId = TypeId(1);
    pub const INT4: TypeId = TypeId(2);
    pub const INT8: TypeId = TypeId(3);
    pub const FLOAT4: TypeId = TypeId(4);
    pub const FLOAT8: TypeId = TypeId(5);
    pub const TEXT: TypeId = TypeId(6);
    pub const BYTEA: TypeId = TypeId(7);
    pub const UUID: TypeId = TypeId(8);
    /// Pseudo type, rejected by every entry-creating operation.
    pub const ANY: TypeId = TypeId(9);
    /// Pseudo type, rejected by every entry-creating operation.
    pub const RECORD: TypeId = TypeId(10);

    pub fn new() -> Self {
        Self
    }

    fn def(&self, ty: TypeId) -> Result<&'static BuiltinType> {
        TYPES
            .get(ty.index())
            .ok_or_else(|| Error::Internal(format!("unknown {ty}")))
    }
}

impl TypeCatalog for BuiltinCatalog {
    fn lookup(&self, namespace: &str, name: &str) -> Option<TypeId> {
        if namespace != CORE_NAMESPACE {
            return None;
        }
        TYPES
            .iter()
            .position(|t| t.name == name)
            .map(|i| TypeId(i as u32))
    }

    fn name_of(&self, ty: TypeId) -> Option<(&str, &str)> {
        TYPES.get(ty.index()).map(|t| (CORE_NAMESPACE, t.name))
    }

    fn width_of(&self, ty: TypeId) -> Result<WidthClass> {
        let def = self.def(ty)?;
        if def.pseudo {
            return Err(Error::UnsupportedType(def.name.to_string()));
        }
        Ok(def.width)
    }

    fn is_pseudo(&self, ty: TypeId) -> bool {
        TYPES.get(ty.index()).map(|t| t.pseudo).unwrap_or(false)
    }

    fn text_io(&self, ty: TypeId) -> Result<TextIo> {
        let def = self.def(ty)?;
        def.io
            .ok_or_else(|| Error::UnsupportedType(def.name.to_string()))
    }

    fn direct_conversion(&self, from: TypeId, to: TypeId) -> Option<ConvFn> {
        match (from, to) {
            // integer widening is a relabel of the inline word
            (Self::INT2, Self::INT4) | (Self::INT2, Self::INT8) | (Self::INT4, Self::INT8) => {
                Some(int_widen)
            }
            (Self::INT8, Self::INT4) => Some(int8_to_int4),
            (Self::INT8, Self::INT2) => Some(int8_to_int2),
            (Self::INT4, Self::INT2) => Some(int4_to_int2),
            (Self::INT2, Self::FLOAT8) | (Self::INT4, Self::FLOAT8) | (Self::INT8, Self::FLOAT8) => {
                Some(int_to_float8)
            }
            (Self::INT2, Self::FLOAT4) | (Self::INT4, Self::FLOAT4) => Some(int_to_float4),
            (Self::FLOAT4, Self::FLOAT8) => Some(float4_to_float8),
            (Self::FLOAT8, Self::FLOAT4) => Some(float8_to_float4),
            (Self::FLOAT8, Self::INT8) => Some(float8_to_int8),
            (Self::FLOAT8, Self::INT4) => Some(float8_to_int4),
            (Self::FLOAT4, Self::INT4) => Some(float4_to_int4),
            (Self::BOOL, Self::INT4) => Some(bool_to_int4),
            (Self::INT4, Self::BOOL) => Some(int4_to_bool),
            _ => None,
        }
    }
}

fn shape_err(type_name: &str) -> Error {
    Error::Internal(format!("malformed {type_name} payload"))
}

fn parse_err(to: &str) -> Error {
    Error::CoercionFailed { from: "text".to_string(), to: to.to_string() }
}

fn range_err(from: &str, to: &str) -> Error {
    Error::CoercionFailed { from: from.to_string(), to: to.to_string() }
}

// ---- text primitives ----

fn bool_out(c: &Content) -> Result<String> {
    let v = c.as_bool().ok_or_else(|| shape_err("bool"))?;
    Ok(if v { "true" } else { "false" }.to_string())
}

fn bool_in(s: &str) -> Result<Content> {
    match s.trim() {
        "true" | "t" | "1" => Ok(Content::from_bool(true)),
        "false" | "f" | "0" => Ok(Content::from_bool(false)),
        _ => Err(parse_err("bool")),
    }
}

fn int_out(c: &Content) -> Result<String> {
    let v = c.as_i64().ok_or_else(|| shape_err("integer"))?;
    Ok(v.to_string())
}

fn int2_in(s: &str) -> Result<Content> {
    let v: i16 = s.trim().parse().map_err(|_| parse_err("int2"))?;
    Ok(Content::from_i64(v as i64))
}

fn int4_in(s: &str) -> Result<Content> {
    let v: i32 = s.trim().parse().map_err(|_| parse_err("int4"))?;
    Ok(Content::from_i64(v as i64))
}

fn int8_in(s: &str) -> Result<Content> {
    let v: i64 = s.trim().parse().map_err(|_| parse_err("int8"))?;
    Ok(Content::from_i64(v))
}

fn float4_out(c: &Content) -> Result<String> {
    let v = c.as_f32().ok_or_else(|| shape_err("float4"))?;
    Ok(v.to_string())
}

fn float4_in(s: &str) -> Result<Content> {
    let v: f32 = s.trim().parse().map_err(|_| parse_err("float4"))?;
    Ok(Content::from_f32(v))
}

fn float8_out(c: &Content) -> Result<String> {
    let v = c.as_f64().ok_or_else(|| shape_err("float8"))?;
    Ok(v.to_string())
}

fn float8_in(s: &str) -> Result<Content> {
    let v: f64 = s.trim().parse().map_err(|_| parse_err("float8"))?;
    Ok(Content::from_f64(v))
}

fn text_out(c: &Content) -> Result<String> {
    let v = c.as_str().ok_or_else(|| shape_err("text"))?;
    Ok(v.to_string())
}

fn text_in(s: &str) -> Result<Content> {
    Ok(Content::from_text(s))
}

fn bytea_out(c: &Content) -> Result<String> {
    let bytes = c.bytes().ok_or_else(|| shape_err("bytea"))?;
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    Ok(out)
}

fn bytea_in(s: &str) -> Result<Content> {
    let hex = s
        .trim()
        .strip_prefix("\\x")
        .ok_or_else(|| parse_err("bytea"))?;
    if hex.len() % 2 != 0 {
        return Err(parse_err("bytea"));
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let pair = std::str::from_utf8(chunk).map_err(|_| parse_err("bytea"))?;
        bytes.push(u8::from_str_radix(pair, 16).map_err(|_| parse_err("bytea"))?);
    }
    Ok(Content::from_bytes(bytes))
}

fn uuid_out(c: &Content) -> Result<String> {
    let bytes = c.bytes().ok_or_else(|| shape_err("uuid"))?;
    let id = Uuid::from_slice(bytes).map_err(|_| shape_err("uuid"))?;
    Ok(id.to_string())
}

fn uuid_in(s: &str) -> Result<Content> {
    let id = Uuid::parse_str(s.trim()).map_err(|_| parse_err("uuid"))?;
    Ok(Content::from_bytes(id.as_bytes().to_vec()))
}

// ---- direct conversions ----

fn int_widen(c: &Content) -> Result<Content> {
    c.as_i64()
        .map(Content::from_i64)
        .ok_or_else(|| shape_err("integer"))
}

fn int8_to_int4(c: &Content) -> Result<Content> {
    let v = c.as_i64().ok_or_else(|| shape_err("int8"))?;
    i32::try_from(v)
        .map(|v| Content::from_i64(v as i64))
        .map_err(|_| range_err("int8", "int4"))
}

fn int8_to_int2(c: &Content) -> Result<Content> {
    let v = c.as_i64().ok_or_else(|| shape_err("int8"))?;
    i16::try_from(v)
        .map(|v| Content::from_i64(v as i64))
        .map_err(|_| range_err("int8", "int2"))
}

fn int4_to_int2(c: &Content) -> Result<Content> {
    let v = c.as_i64().ok_or_else(|| shape_err("int4"))?;
    i16::try_from(v)
        .map(|v| Content::from_i64(v as i64))
        .map_err(|_| range_err("int4", "int2"))
}

fn int_to_float8(c: &Content) -> Result<Content> {
    let v = c.as_i64().ok_or_else(|| shape_err("integer"))?;
    Ok(Content::from_f64(v as f64))
}

fn int_to_float4(c: &Content) -> Result<Content> {
    let v = c.as_i64().ok_or_else(|| shape_err("integer"))?;
    Ok(Content::from_f32(v as f32))
}

fn float4_to_float8(c: &Content) -> Result<Content> {
    let v = c.as_f32().ok_or_else(|| shape_err("float4"))?;
    Ok(Content::from_f64(v as f64))
}

fn float8_to_float4(c: &Content) -> Result<Content> {
    let v = c.as_f64().ok_or_else(|| shape_err("float8"))?;
    let narrowed = v as f32;
    if v.is_finite() && !narrowed.is_finite() {
        return Err(range_err("float8", "float4"));
    }
    Ok(Content::from_f32(narrowed))
}

fn float8_to_int8(c: &Content) -> Result<Content> {
    let v = c.as_f64().ok_or_else(|| shape_err("float8"))?;
    let rounded = v.round();
    if !rounded.is_finite() || rounded < i64::MIN as f64 || rounded > i64::MAX as f64 {
        return Err(range_err("float8", "int8"));
    }
    Ok(Content::from_i64(rounded as i64))
}

fn float8_to_int4(c: &Content) -> Result<Content> {
    let v = c.as_f64().ok_or_else(|| shape_err("float8"))?;
    let rounded = v.round();
    if !rounded.is_finite() || rounded < i32::MIN as f64 || rounded > i32::MAX as f64 {
        return Err(range_err("float8", "int4"));
    }
    Ok(Content::from_i64(rounded as i64))
}

fn float4_to_int4(c: &Content) -> Result<Content> {
    let v = c.as_f32().ok_or_else(|| shape_err("float4"))?;
    let rounded = v.round();
    if !rounded.is_finite() || rounded < i32::MIN as f32 || rounded > i32::MAX as f32 {
        return Err(range_err("float4", "int4"));
    }
    Ok(Content::from_i64(rounded as i64))
}

fn bool_to_int4(c: &Content) -> Result<Content> {
    let v = c.as_bool().ok_or_else(|| shape_err("bool"))?;
    Ok(Content::from_i64(v as i64))
}

fn int4_to_bool(c: &Content) -> Result<Content> {
    let v = c.as_i64().ok_or_else(|| shape_err("int4"))?;
    Ok(Content::from_bool(v != 0))
}
