//! Index ranges and hyperslab selections over two-dimensional datasets

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::Shape;

/// Axis of a dataset along which incremental reads advance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Row-major access (axis 0)
    Row,
    /// Column access (axis 1)
    Column,
}

impl Axis {
    /// The other axis
    pub fn other(self) -> Axis {
        match self {
            Axis::Row => Axis::Column,
            Axis::Column => Axis::Row,
        }
    }

    /// Extent of this axis in `shape`
    pub fn extent(self, shape: &Shape) -> usize {
        match self {
            Axis::Row => shape.rows(),
            Axis::Column => shape.cols(),
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Row => write!(f, "row"),
            Axis::Column => write!(f, "column"),
        }
    }
}

/// Inclusive index range `[start, end]` along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexRange {
    /// First index
    pub start: usize,

    /// Last index (inclusive)
    pub end: usize,
}

impl IndexRange {
    /// Create a new inclusive range. No validation happens here, see [`IndexRange::validate`].
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Range covering a whole axis of the given extent
    ///
    /// Returns `None` for a zero extent, which has no inclusive representation.
    pub fn full(extent: usize) -> Option<Self> {
        extent.checked_sub(1).map(|end| Self::new(0, end))
    }

    /// Window of at most `size` indices starting at `start`, clamped to `extent`
    pub fn window(start: usize, size: usize, extent: usize) -> Self {
        let end = start
            .saturating_add(size.max(1) - 1)
            .min(extent.saturating_sub(1));
        Self::new(start, end)
    }

    /// Number of indices covered, zero if the range is inverted
    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    /// Whether the range covers no index
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `index` lies within the range
    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index <= self.end
    }

    /// Whether this range covers the whole of an axis with the given extent
    pub fn covers(&self, extent: usize) -> bool {
        self.start == 0 && self.end.checked_add(1) == Some(extent)
    }

    /// Reject inverted ranges and ranges reaching past `extent`
    pub fn validate(&self, axis: Axis, extent: usize) -> Result<()> {
        if self.end < self.start || self.end >= extent {
            return Err(Error::InvalidRange {
                axis,
                start: self.start,
                end: self.end,
                extent,
            });
        }
        Ok(())
    }
}

/// Rectangular selection of rows and columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hyperslab {
    /// Selected rows
    pub rows: IndexRange,

    /// Selected columns
    pub cols: IndexRange,
}

impl Hyperslab {
    /// Create a selection from a row range and a column range
    pub fn new(rows: IndexRange, cols: IndexRange) -> Self {
        Self { rows, cols }
    }

    /// Selection covering all of `shape`, `None` if the shape is empty
    pub fn full(shape: &Shape) -> Option<Self> {
        Some(Self::new(
            IndexRange::full(shape.rows())?,
            IndexRange::full(shape.cols())?,
        ))
    }

    /// Selection of `range` along `axis` and everything along the other axis
    pub fn along(axis: Axis, range: IndexRange, shape: &Shape) -> Option<Self> {
        let other = IndexRange::full(axis.other().extent(shape))?;
        Some(match axis {
            Axis::Row => Self::new(range, other),
            Axis::Column => Self::new(other, range),
        })
    }

    /// Range along `axis`
    pub fn range(&self, axis: Axis) -> IndexRange {
        match axis {
            Axis::Row => self.rows,
            Axis::Column => self.cols,
        }
    }

    /// Check both ranges against the dataset shape
    pub fn validate(&self, shape: &Shape) -> Result<()> {
        self.rows.validate(Axis::Row, shape.rows())?;
        self.cols.validate(Axis::Column, shape.cols())
    }

    /// Shape of the buffer this selection produces
    pub fn shape(&self) -> Shape {
        Shape::new(vec![self.rows.len(), self.cols.len()])
    }
}

impl fmt::Display for Hyperslab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.rows.start, self.rows.end, self.cols.start, self.cols.end
        )
    }
}

impl FromStr for Hyperslab {
    type Err = Error;

    /// Parse the `row-start,row-end,col-start,col-end` form
    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|v| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|e| Error::InvalidArgument(format!("invalid subset bound {v:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        match values.as_slice() {
            [r0, r1, c0, c1] => Ok(Self::new(IndexRange::new(*r0, *r1), IndexRange::new(*c0, *c1))),
            _ => Err(Error::InvalidArgument(format!(
                "subset must have four comma-separated bounds, got {s:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, 10, 25 => (0, 9); "first window")]
    #[test_case(20, 10, 25 => (20, 24); "boundary window is clamped")]
    #[test_case(24, 10, 25 => (24, 24); "last index")]
    #[test_case(3, 1, 25 => (3, 3); "single index window")]
    fn test_window_bounds(start: usize, size: usize, extent: usize) -> (usize, usize) {
        let w = IndexRange::window(start, size, extent);
        (w.start, w.end)
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let err = IndexRange::new(5, 2).validate(Axis::Row, 10).unwrap_err();
        assert!(matches!(err, Error::InvalidRange { start: 5, end: 2, .. }));
    }

    #[test]
    fn test_range_past_extent_is_rejected() {
        assert!(IndexRange::new(0, 10).validate(Axis::Column, 10).is_err());
        assert!(IndexRange::new(0, 9).validate(Axis::Column, 10).is_ok());
    }

    #[test]
    fn test_hyperslab_text_form() {
        let slab: Hyperslab = "2,5,0,3".parse().unwrap();
        assert_eq!(slab.rows, IndexRange::new(2, 5));
        assert_eq!(slab.cols, IndexRange::new(0, 3));
        assert_eq!(slab.to_string(), "2,5,0,3");
        assert_eq!(slab.shape().dims(), &[4, 4]);
    }

    #[test_case("1,2,3"; "too few bounds")]
    #[test_case("1,2,3,4,5"; "too many bounds")]
    #[test_case("a,2,3,4"; "not a number")]
    #[test_case(""; "empty")]
    fn test_hyperslab_rejects_malformed(text: &str) {
        assert!(matches!(text.parse::<Hyperslab>(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_along_axis() {
        let shape = Shape::new(vec![8, 3]);
        let slab = Hyperslab::along(Axis::Column, IndexRange::new(1, 2), &shape).unwrap();
        assert_eq!(slab.rows, IndexRange::new(0, 7));
        assert_eq!(slab.cols, IndexRange::new(1, 2));
        assert!(slab.rows.covers(8));
    }
}
