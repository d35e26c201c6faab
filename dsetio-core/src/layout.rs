//! Schema-driven decoding of packed binary records
//!
//! A compound dataset stores records as packed bytes whose field order is
//! known but whose byte offsets are not. The layout therefore derives every
//! offset from the declared field widths, walking the fields in the order
//! the source schema lists them. Reordering the source members without
//! updating the destination widths silently shifts every later field, so
//! callers must describe string widths exactly.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bytes;
use crate::error::{Error, Result};

/// Kind and width of one record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Unsigned byte (1 byte)
    UInt8,

    /// 32-bit signed integer (4 bytes)
    Int32,

    /// 32-bit floating point (4 bytes)
    Float32,

    /// 64-bit floating point (8 bytes)
    Float64,

    /// NUL-padded string of the given byte width
    FixedString(usize),
}

impl FieldKind {
    /// Number of packed bytes the field occupies
    pub fn width(self) -> usize {
        match self {
            FieldKind::UInt8 => 1,
            FieldKind::Int32 | FieldKind::Float32 => 4,
            FieldKind::Float64 => 8,
            FieldKind::FixedString(width) => width,
        }
    }

    fn decode(self, raw: &[u8]) -> Result<Value> {
        Ok(match self {
            FieldKind::UInt8 => Value::UInt8(raw[0]),
            FieldKind::Int32 => Value::Int32(bytes::i32_from_le(raw)?),
            FieldKind::Float32 => Value::Float32(bytes::f32_from_le(raw)?),
            FieldKind::Float64 => Value::Float64(bytes::f64_from_le(raw)?),
            FieldKind::FixedString(_) => {
                let text = String::from_utf8_lossy(raw);
                Value::String(text.trim_end_matches('\0').to_string())
            }
        })
    }
}

/// One destination field: its name in the source schema and its kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Member name as it appears in the source record type
    pub name: String,

    /// Kind and width of the field
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// Create a field descriptor
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Unsigned byte field
    pub fn u8(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::UInt8)
    }

    /// 32-bit integer field
    pub fn i32(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Int32)
    }

    /// 32-bit float field
    pub fn f32(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float32)
    }

    /// 64-bit float field
    pub fn f64(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float64)
    }

    /// Fixed-width string field
    pub fn string(name: impl Into<String>, width: usize) -> Self {
        Self::new(name, FieldKind::FixedString(width))
    }
}

/// Destination record description, fields in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordSchema {
    fields: Vec<FieldDescriptor>,
}

impl RecordSchema {
    /// Create a schema from fields in declaration order
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    /// The fields in declaration order
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Unsigned byte
    UInt8(u8),
    /// 32-bit integer
    Int32(i32),
    /// 32-bit float
    Float32(f32),
    /// 64-bit float
    Float64(f64),
    /// Trimmed string
    String(String),
}

impl Value {
    fn kind_name(&self) -> &'static str {
        match self {
            Value::UInt8(_) => "u8",
            Value::Int32(_) => "i32",
            Value::Float32(_) => "f32",
            Value::Float64(_) => "f64",
            Value::String(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::UInt8(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
        }
    }
}

macro_rules! value_conversion {
    ($target:ty, $variant:ident, $name:literal) => {
        impl TryFrom<Value> for $target {
            type Error = Error;

            fn try_from(value: Value) -> Result<Self> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(Error::TypeMismatch(format!(
                        "expected {} field, found {}",
                        $name,
                        other.kind_name()
                    ))),
                }
            }
        }
    };
}

value_conversion!(u8, UInt8, "u8");
value_conversion!(i32, Int32, "i32");
value_conversion!(f32, Float32, "f32");
value_conversion!(f64, Float64, "f64");
value_conversion!(String, String, "string");

/// One decoded record, values in destination declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    /// Values in destination declaration order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the record into its values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Value of the destination field at `index`
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Typed copy of the destination field at `index`
    pub fn extract<T>(&self, index: usize) -> Result<T>
    where
        T: TryFrom<Value, Error = Error>,
    {
        let value = self.values.get(index).cloned().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "record has {} fields, no field {index}",
                self.values.len()
            ))
        })?;
        T::try_from(value)
    }
}

/// Types that describe their own packed record layout
///
/// This replaces runtime inspection of the destination struct: the type
/// lists its fields explicitly and builds itself from a decoded [`Record`].
pub trait FromRecord: Sized {
    /// Destination schema, fields in declaration order
    fn schema() -> RecordSchema;

    /// Build the value from a record decoded against [`FromRecord::schema`]
    fn from_record(record: &Record) -> Result<Self>;
}

/// Position of one source field in the packed record and in the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutEntry {
    /// Index of the member in the source schema
    pub source_index: usize,

    /// Index of the field in the destination schema
    pub target_index: usize,

    /// Kind (and so width) of the field
    pub kind: FieldKind,
}

/// Mapping from a packed source record onto a destination schema
///
/// Built once per destination type and reused for every record of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    entries: Vec<LayoutEntry>,
    stride: usize,
}

impl RecordLayout {
    /// Map source member names (in source order) onto `dest`
    ///
    /// Fails with [`Error::SchemaMismatch`] when the member counts differ or a
    /// source member has no destination field of the same name.
    pub fn build<S: AsRef<str>>(source_names: &[S], dest: &RecordSchema) -> Result<Self> {
        if source_names.len() != dest.len() {
            return Err(Error::SchemaMismatch(format!(
                "source record has {} members but the destination declares {} fields",
                source_names.len(),
                dest.len()
            )));
        }

        let by_name: HashMap<&str, usize> = dest
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.as_str(), i))
            .collect();

        let mut claimed = vec![false; dest.len()];
        let mut entries = Vec::with_capacity(source_names.len());
        for (source_index, name) in source_names.iter().enumerate() {
            let name = name.as_ref().trim();
            let target_index = *by_name.get(name).ok_or_else(|| {
                Error::SchemaMismatch(format!("invalid field in the source record: {name}"))
            })?;
            if std::mem::replace(&mut claimed[target_index], true) {
                return Err(Error::SchemaMismatch(format!(
                    "source member {name} appears more than once"
                )));
            }
            entries.push(LayoutEntry {
                source_index,
                target_index,
                kind: dest.fields()[target_index].kind,
            });
        }

        let stride = entries.iter().map(|e| e.kind.width()).sum();
        tracing::debug!(fields = entries.len(), stride, "built record layout");
        Ok(Self { entries, stride })
    }

    /// Bytes consumed by one record
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Entries in source order
    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    /// Decode the record starting at the beginning of `raw`
    pub fn decode_record(&self, raw: &[u8]) -> Result<Record> {
        if raw.len() < self.stride {
            return Err(Error::BufferTooShort {
                needed: self.stride,
                actual: raw.len(),
            });
        }

        let mut slots: Vec<Option<Value>> = vec![None; self.entries.len()];
        let mut cursor = 0;
        for entry in &self.entries {
            let width = entry.kind.width();
            slots[entry.target_index] = Some(entry.kind.decode(&raw[cursor..cursor + width])?);
            cursor += width;
        }

        let values = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::SchemaMismatch("destination field left unmapped".into()))?;
        Ok(Record { values })
    }

    /// Decode `count` consecutive records
    pub fn decode_all(&self, raw: &[u8], count: usize) -> Result<Vec<Record>> {
        let needed = self.stride * count;
        if raw.len() < needed {
            return Err(Error::BufferTooShort {
                needed,
                actual: raw.len(),
            });
        }
        if self.stride == 0 {
            return (0..count).map(|_| self.decode_record(raw)).collect();
        }
        raw[..needed]
            .chunks_exact(self.stride)
            .map(|chunk| self.decode_record(chunk))
            .collect()
    }

    /// Decode `count` consecutive records straight into `T`
    pub fn decode_all_as<T: FromRecord>(&self, raw: &[u8], count: usize) -> Result<Vec<T>> {
        self.decode_all(raw, count)?
            .iter()
            .map(T::from_record)
            .collect()
    }
}
