//! Element types, dataset shapes and fixed-width string column sets

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Element type of a dataset buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    /// 32-bit signed integer
    Int32,

    /// 32-bit floating point
    Float32,

    /// 64-bit floating point
    Float64,

    /// Rows of fixed-width, padded character fields
    FixedString,
}

impl ElementType {
    /// Numeric selector passed to the worker process
    pub fn code(self) -> u32 {
        match self {
            ElementType::Int32 => 5,
            ElementType::Float32 => 13,
            ElementType::Float64 => 14,
            ElementType::FixedString => 24,
        }
    }

    /// Inverse of [`ElementType::code`]
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            5 => Ok(ElementType::Int32),
            13 => Ok(ElementType::Float32),
            14 => Ok(ElementType::Float64),
            24 => Ok(ElementType::FixedString),
            other => Err(Error::InvalidArgument(format!("unknown element type selector {other}"))),
        }
    }

    /// Size of one element in bytes, `None` for string rows whose width comes from the column set
    pub fn size_bytes(self) -> Option<usize> {
        match self {
            ElementType::Int32 | ElementType::Float32 => Some(4),
            ElementType::Float64 => Some(8),
            ElementType::FixedString => None,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Int32 => "int32",
            ElementType::Float32 => "float32",
            ElementType::Float64 => "float64",
            ElementType::FixedString => "fixed-string",
        };
        f.write_str(name)
    }
}

/// Dimensions of a dataset or of a loaded buffer
///
/// One-dimensional datasets are treated as a single column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a shape from its dimensions
    pub fn new(dims: Vec<usize>) -> Self {
        Self(dims)
    }

    /// Dimensions in storage order
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of rows (first dimension)
    pub fn rows(&self) -> usize {
        self.0.first().copied().unwrap_or(0)
    }

    /// Number of columns (second dimension), 1 for one-dimensional datasets
    pub fn cols(&self) -> usize {
        match self.0.len() {
            0 => 0,
            1 => 1,
            _ => self.0[1],
        }
    }

    /// Total number of elements
    pub fn element_count(&self) -> usize {
        if self.0.is_empty() {
            0
        } else {
            self.0.iter().product()
        }
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Ordered set of fixed byte widths, one per string column
///
/// Each row of a fixed-width string dataset is the concatenation of its
/// column fields, so the row width is the sum of the column widths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StrColumns {
    widths: Vec<usize>,
    row_width: usize,
}

impl StrColumns {
    /// Create a column set from per-column widths
    pub fn new(widths: Vec<usize>) -> Self {
        let row_width = widths.iter().sum();
        Self { widths, row_width }
    }

    /// Per-column widths
    pub fn widths(&self) -> &[usize] {
        &self.widths
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.widths.len()
    }

    /// Whether the set has no columns
    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    /// Byte width of a whole row
    pub fn row_width(&self) -> usize {
        self.row_width
    }

    /// Byte offset of column `col` within a row
    pub fn offset_of(&self, col: usize) -> Result<usize> {
        self.check(col)?;
        Ok(self.widths[..col].iter().sum())
    }

    /// Byte width of column `col`
    pub fn width(&self, col: usize) -> Result<usize> {
        self.check(col)?;
        Ok(self.widths[col])
    }

    /// Column set restricted to the columns in `range`
    pub fn slice(&self, range: RangeInclusive<usize>) -> Result<Self> {
        self.check(*range.end())?;
        if range.start() > range.end() {
            return Err(Error::InvalidArgument(format!(
                "inverted column range {}..={}",
                range.start(),
                range.end()
            )));
        }
        Ok(Self::new(self.widths[range].to_vec()))
    }

    fn check(&self, col: usize) -> Result<()> {
        if col >= self.widths.len() {
            return Err(Error::InvalidArgument(format!(
                "column {col} exceeds the {} columns of the string set",
                self.widths.len()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for StrColumns {
    /// Comma-joined widths, the form carried in the worker environment
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .widths
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&joined)
    }
}

impl FromStr for StrColumns {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        let widths = s
            .split(',')
            .map(|w| {
                w.trim()
                    .parse::<usize>()
                    .map_err(|e| Error::InvalidArgument(format!("invalid string width {w:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(widths))
    }
}
