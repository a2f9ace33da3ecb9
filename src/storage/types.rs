//! Scalar types shared by the existence table and the column stores
//!
//! Fixed-width elements are stored little-endian. `Text` is the only
//! variable-width element type; it can be served from the column cache but
//! never eagerly loaded into a chunk buffer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical row slot identifier.
///
/// Monotonically increasing; a row-id may be unassigned or assigned-but-deleted.
pub type RowId = i64;

/// Element type of a column store value array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// 1-byte boolean (0 = false)
    Bool,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
    /// UTF-8 text, variable width
    Text,
}

impl ElementType {
    /// Byte width of one element, or `None` for variable-width types.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            ElementType::Bool => Some(1),
            ElementType::Int16 => Some(2),
            ElementType::Int32 => Some(4),
            ElementType::Int64 => Some(8),
            ElementType::Float32 => Some(4),
            ElementType::Float64 => Some(8),
            ElementType::Text => None,
        }
    }

    /// Whether values of this type have a fixed byte width.
    pub fn is_fixed_width(&self) -> bool {
        self.fixed_width().is_some()
    }

    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ElementType::Bool => "bool",
            ElementType::Int16 => "int16",
            ElementType::Int32 => "int32",
            ElementType::Int64 => "int64",
            ElementType::Float32 => "float32",
            ElementType::Float64 => "float64",
            ElementType::Text => "text",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// A single non-null column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
}

impl Datum {
    /// Element type this datum belongs to.
    pub fn elem_type(&self) -> ElementType {
        match self {
            Datum::Bool(_) => ElementType::Bool,
            Datum::Int16(_) => ElementType::Int16,
            Datum::Int32(_) => ElementType::Int32,
            Datum::Int64(_) => ElementType::Int64,
            Datum::Float32(_) => ElementType::Float32,
            Datum::Float64(_) => ElementType::Float64,
            Datum::Text(_) => ElementType::Text,
        }
    }

    /// Decode one element from its stored byte representation.
    ///
    /// Returns `None` when `bytes` is too short for a fixed-width type or is
    /// not valid UTF-8 for `Text`.
    pub fn decode(elem_type: ElementType, bytes: &[u8]) -> Option<Datum> {
        match elem_type {
            ElementType::Bool => bytes.first().map(|b| Datum::Bool(*b != 0)),
            ElementType::Int16 => Some(Datum::Int16(i16::from_le_bytes(
                bytes.get(..2)?.try_into().ok()?,
            ))),
            ElementType::Int32 => Some(Datum::Int32(i32::from_le_bytes(
                bytes.get(..4)?.try_into().ok()?,
            ))),
            ElementType::Int64 => Some(Datum::Int64(i64::from_le_bytes(
                bytes.get(..8)?.try_into().ok()?,
            ))),
            ElementType::Float32 => Some(Datum::Float32(f32::from_le_bytes(
                bytes.get(..4)?.try_into().ok()?,
            ))),
            ElementType::Float64 => Some(Datum::Float64(f64::from_le_bytes(
                bytes.get(..8)?.try_into().ok()?,
            ))),
            ElementType::Text => std::str::from_utf8(bytes)
                .ok()
                .map(|s| Datum::Text(s.to_string())),
        }
    }

    /// Encode into the stored byte representation.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Datum::Bool(v) => vec![u8::from(*v)],
            Datum::Int16(v) => v.to_le_bytes().to_vec(),
            Datum::Int32(v) => v.to_le_bytes().to_vec(),
            Datum::Int64(v) => v.to_le_bytes().to_vec(),
            Datum::Float32(v) => v.to_le_bytes().to_vec(),
            Datum::Float64(v) => v.to_le_bytes().to_vec(),
            Datum::Text(v) => v.as_bytes().to_vec(),
        }
    }

    /// Coerce a JSON value into a datum of the given element type.
    pub fn from_json(elem_type: ElementType, value: &serde_json::Value) -> Option<Datum> {
        match elem_type {
            ElementType::Bool => value.as_bool().map(Datum::Bool),
            ElementType::Int16 => value
                .as_i64()
                .and_then(|v| i16::try_from(v).ok())
                .map(Datum::Int16),
            ElementType::Int32 => value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Datum::Int32),
            ElementType::Int64 => value.as_i64().map(Datum::Int64),
            ElementType::Float32 => value.as_f64().map(|v| Datum::Float32(v as f32)),
            ElementType::Float64 => value.as_f64().map(Datum::Float64),
            ElementType::Text => value.as_str().map(|s| Datum::Text(s.to_string())),
        }
    }
}

/// Descriptor of one attribute of the logical table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDesc {
    /// Attribute name
    pub name: String,
    /// Element type of its column store
    #[serde(rename = "type")]
    pub elem_type: ElementType,
    /// Dropped attributes have no column store
    #[serde(default)]
    pub dropped: bool,
}

impl ColumnDesc {
    /// Create a live column descriptor
    pub fn new(name: impl Into<String>, elem_type: ElementType) -> Self {
        Self {
            name: name.into(),
            elem_type,
            dropped: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_widths() {
        assert_eq!(ElementType::Bool.fixed_width(), Some(1));
        assert_eq!(ElementType::Int16.fixed_width(), Some(2));
        assert_eq!(ElementType::Float64.fixed_width(), Some(8));
        assert_eq!(ElementType::Text.fixed_width(), None);
        assert!(!ElementType::Text.is_fixed_width());
    }

    #[test]
    fn test_decode_short_buffer() {
        assert_eq!(Datum::decode(ElementType::Int64, &[1, 2, 3]), None);
        assert_eq!(Datum::decode(ElementType::Bool, &[]), None);
    }

    #[test]
    fn test_decode_little_endian() {
        let bytes = 258i32.to_le_bytes();
        assert_eq!(
            Datum::decode(ElementType::Int32, &bytes),
            Some(Datum::Int32(258))
        );
        assert_eq!(
            Datum::decode(ElementType::Text, b"abc"),
            Some(Datum::Text("abc".into()))
        );
    }

    #[test]
    fn test_from_json_rejects_out_of_range() {
        let v = serde_json::json!(70000);
        assert_eq!(Datum::from_json(ElementType::Int16, &v), None);
        assert_eq!(
            Datum::from_json(ElementType::Int32, &v),
            Some(Datum::Int32(70000))
        );
    }

    #[test]
    fn test_column_desc_json() {
        let desc: ColumnDesc =
            serde_json::from_str(r#"{"name": "price", "type": "float64"}"#).unwrap();
        assert_eq!(desc.elem_type, ElementType::Float64);
        assert!(!desc.dropped);
    }
}
