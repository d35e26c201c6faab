//! Read options fixed at dataset-handle construction

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{ElementType, StrColumns};
use crate::selection::{Axis, IndexRange};

/// Incremental access configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incremental {
    /// Axis along which windows advance
    pub axis: Axis,

    /// Number of indices fetched per window
    pub window: usize,
}

/// Immutable configuration of a dataset handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    element: ElementType,
    str_columns: StrColumns,
    incremental: Option<Incremental>,
    read_on_create: bool,
}

impl ReadOptions {
    /// Start building options for `element` datasets
    pub fn builder(element: ElementType) -> ReadOptionsBuilder {
        ReadOptionsBuilder::new(element)
    }

    /// Plain options for a numeric element type: no windowing, lazy load
    pub fn new(element: ElementType) -> Self {
        Self {
            element,
            str_columns: StrColumns::default(),
            incremental: None,
            read_on_create: false,
        }
    }

    /// Element type of the dataset
    pub fn element(&self) -> ElementType {
        self.element
    }

    /// String column widths, empty for numeric datasets
    pub fn str_columns(&self) -> &StrColumns {
        &self.str_columns
    }

    /// Incremental configuration, `None` when reads are not windowed
    pub fn incremental(&self) -> Option<Incremental> {
        self.incremental
    }

    /// Whether the whole dataset is loaded when the handle is created
    pub fn read_on_create(&self) -> bool {
        self.read_on_create
    }

    /// Byte width of one row for string datasets, 0 otherwise
    pub fn row_width(&self) -> usize {
        match self.element {
            ElementType::FixedString => self.str_columns.row_width(),
            _ => 0,
        }
    }

    /// Byte width of one row restricted to the columns in `cols`, 0 for numeric datasets
    pub fn subset_row_width(&self, cols: IndexRange) -> Result<usize> {
        match self.element {
            ElementType::FixedString => Ok(self.str_columns.slice(cols.start..=cols.end)?.row_width()),
            _ => Ok(0),
        }
    }
}

/// Builder for [`ReadOptions`]
#[derive(Debug, Clone)]
pub struct ReadOptionsBuilder {
    element: ElementType,
    str_columns: StrColumns,
    incremental: Option<Incremental>,
    read_on_create: bool,
}

impl ReadOptionsBuilder {
    /// Create a builder for `element` datasets
    pub fn new(element: ElementType) -> Self {
        Self {
            element,
            str_columns: StrColumns::default(),
            incremental: None,
            read_on_create: false,
        }
    }

    /// Set the string column widths
    pub fn str_columns(mut self, columns: StrColumns) -> Self {
        self.str_columns = columns;
        self
    }

    /// Read incrementally along `axis`, `window` indices at a time
    pub fn incremental(mut self, axis: Axis, window: usize) -> Self {
        self.incremental = Some(Incremental { axis, window });
        self
    }

    /// Load the whole dataset when the handle is created
    pub fn read_on_create(mut self, read: bool) -> Self {
        self.read_on_create = read;
        self
    }

    /// Validate and build the options
    pub fn build(self) -> Result<ReadOptions> {
        if let Some(inc) = self.incremental {
            if inc.window == 0 {
                return Err(Error::InvalidArgument(
                    "incremental window size must be at least 1".into(),
                ));
            }
        }

        match self.element {
            ElementType::FixedString if self.str_columns.is_empty() => {
                return Err(Error::InvalidArgument(
                    "fixed-width string datasets need their column widths".into(),
                ));
            }
            ElementType::FixedString => {}
            other if !self.str_columns.is_empty() => {
                return Err(Error::InvalidArgument(format!(
                    "string column widths given for a {other} dataset"
                )));
            }
            _ => {}
        }

        Ok(ReadOptions {
            element: self.element,
            str_columns: self.str_columns,
            incremental: self.incremental,
            read_on_create: self.read_on_create,
        })
    }
}
