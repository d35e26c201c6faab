//! Typed dataset buffers and the data record that carries them

use serde::{Deserialize, Serialize};

use crate::bytes;
use crate::error::{Error, Result};
use crate::schema::{ElementType, Shape};

/// Buffer holding the elements of a dataset or of a window into it
///
/// Numeric buffers are stored row-major. Fixed-width string datasets are
/// held as raw bytes, one row of concatenated column fields after another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Buffer {
    /// 32-bit floating point elements
    Float32(Vec<f32>),

    /// 64-bit floating point elements
    Float64(Vec<f64>),

    /// 32-bit signed integer elements
    Int32(Vec<i32>),

    /// Raw bytes of fixed-width string rows
    Bytes(Vec<u8>),
}

impl Buffer {
    /// Allocate a zeroed buffer for `shape`
    ///
    /// `row_width` is the byte width of one string row and is only used for
    /// [`ElementType::FixedString`].
    pub fn allocate(element: ElementType, shape: &Shape, row_width: usize) -> Self {
        let count = shape.element_count();
        match element {
            ElementType::Float32 => Buffer::Float32(vec![0.0; count]),
            ElementType::Float64 => Buffer::Float64(vec![0.0; count]),
            ElementType::Int32 => Buffer::Int32(vec![0; count]),
            ElementType::FixedString => Buffer::Bytes(vec![0; row_width * shape.rows()]),
        }
    }

    /// Empty buffer of the given element type
    pub fn empty(element: ElementType) -> Self {
        Self::allocate(element, &Shape::default(), 0)
    }

    /// Decode little-endian bytes into a buffer of `element`
    pub fn from_le_bytes(element: ElementType, raw: &[u8]) -> Result<Self> {
        let width = element.size_bytes().unwrap_or(1);
        if raw.len() % width != 0 {
            return Err(Error::BufferTooShort {
                needed: raw.len().div_ceil(width) * width,
                actual: raw.len(),
            });
        }
        let chunks = raw.chunks_exact(width);
        Ok(match element {
            ElementType::Float32 => Buffer::Float32(chunks.map(bytes::f32_from_le).collect::<Result<_>>()?),
            ElementType::Float64 => Buffer::Float64(chunks.map(bytes::f64_from_le).collect::<Result<_>>()?),
            ElementType::Int32 => Buffer::Int32(chunks.map(bytes::i32_from_le).collect::<Result<_>>()?),
            ElementType::FixedString => Buffer::Bytes(raw.to_vec()),
        })
    }

    /// Element type held by this buffer
    pub fn element_type(&self) -> ElementType {
        match self {
            Buffer::Float32(_) => ElementType::Float32,
            Buffer::Float64(_) => ElementType::Float64,
            Buffer::Int32(_) => ElementType::Int32,
            Buffer::Bytes(_) => ElementType::FixedString,
        }
    }

    /// Number of elements (bytes for string buffers)
    pub fn len(&self) -> usize {
        match self {
            Buffer::Float32(v) => v.len(),
            Buffer::Float64(v) => v.len(),
            Buffer::Int32(v) => v.len(),
            Buffer::Bytes(v) => v.len(),
        }
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Typed view of the elements
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        T::view(self).ok_or_else(|| {
            Error::TypeMismatch(format!(
                "requested {} elements from a {} buffer",
                T::TYPE,
                self.element_type()
            ))
        })
    }

    /// Raw bytes of a string buffer
    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Buffer::Bytes(v) => Ok(v),
            other => Err(Error::TypeMismatch(format!(
                "requested string rows from a {} buffer",
                other.element_type()
            ))),
        }
    }

    /// Replace the contents of `self` with `other`, which must have the same type and length
    pub fn fill_from(&mut self, other: Buffer) -> Result<()> {
        if self.element_type() != other.element_type() {
            return Err(Error::TypeMismatch(format!(
                "cannot fill a {} buffer with {} data",
                self.element_type(),
                other.element_type()
            )));
        }
        if self.len() != other.len() {
            return Err(Error::InvalidArgument(format!(
                "destination holds {} elements but the read produced {}",
                self.len(),
                other.len()
            )));
        }
        *self = other;
        Ok(())
    }
}

/// Numeric element types that can be viewed out of a [`Buffer`]
pub trait Element: Copy + Send + Sync + 'static {
    /// Element type tag
    const TYPE: ElementType;

    /// Borrow the buffer's elements if it holds this type
    fn view(buffer: &Buffer) -> Option<&[Self]>;
}

impl Element for f32 {
    const TYPE: ElementType = ElementType::Float32;

    fn view(buffer: &Buffer) -> Option<&[Self]> {
        match buffer {
            Buffer::Float32(v) => Some(v),
            _ => None,
        }
    }
}

impl Element for f64 {
    const TYPE: ElementType = ElementType::Float64;

    fn view(buffer: &Buffer) -> Option<&[Self]> {
        match buffer {
            Buffer::Float64(v) => Some(v),
            _ => None,
        }
    }
}

impl Element for i32 {
    const TYPE: ElementType = ElementType::Int32;

    fn view(buffer: &Buffer) -> Option<&[Self]> {
        match buffer {
            Buffer::Int32(v) => Some(v),
            _ => None,
        }
    }
}

/// Result of one read: the loaded buffer plus its dimension metadata
///
/// `dims` is always the shape of `buffer`; `dset_dims` is the shape of the
/// whole dataset and does not change between reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetData {
    /// Dimensions of the full dataset
    pub dset_dims: Shape,

    /// Dimensions of the loaded buffer
    pub dims: Shape,

    /// The loaded elements
    pub buffer: Buffer,
}

impl DatasetData {
    /// Dimension-only record with an empty buffer
    pub fn dims_only(dset_dims: Shape, element: ElementType) -> Self {
        Self {
            dset_dims,
            dims: Shape::default(),
            buffer: Buffer::empty(element),
        }
    }

    /// Check that `dims` describes `buffer`
    ///
    /// String buffers are checked against `row_width` bytes per row when it is known.
    pub fn check_consistent(&self, row_width: Option<usize>) -> Result<()> {
        let expected = match (&self.buffer, row_width) {
            (Buffer::Bytes(_), Some(width)) => self.dims.rows() * width,
            (Buffer::Bytes(bytes), None) => bytes.len(),
            _ => self.dims.element_count(),
        };
        if expected != self.buffer.len() {
            return Err(Error::InvalidArgument(format!(
                "dimensions {} describe {expected} elements but the buffer holds {}",
                self.dims,
                self.buffer.len()
            )));
        }
        Ok(())
    }
}
