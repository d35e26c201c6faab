//! Row, column and hyperslab slicing of row-major buffers

use dsetio_core::buffer::Buffer;
use dsetio_core::error::{Error, Result};
use dsetio_core::schema::{Shape, StrColumns};
use dsetio_core::selection::Hyperslab;

/// Copy the region `slab` out of a buffer holding all of `shape`
///
/// `columns` describes the string columns of `shape` and is ignored for
/// numeric buffers.
pub fn extract(buffer: &Buffer, shape: &Shape, slab: &Hyperslab, columns: &StrColumns) -> Result<Buffer> {
    slab.validate(shape)?;
    let cols = shape.cols();
    Ok(match buffer {
        Buffer::Float32(v) => Buffer::Float32(extract_values(v, cols, slab)?),
        Buffer::Float64(v) => Buffer::Float64(extract_values(v, cols, slab)?),
        Buffer::Int32(v) => Buffer::Int32(extract_values(v, cols, slab)?),
        Buffer::Bytes(v) => Buffer::Bytes(extract_strings(v, columns, slab)?),
    })
}

fn extract_values<T: Copy>(data: &[T], cols: usize, slab: &Hyperslab) -> Result<Vec<T>> {
    let width = slab.cols.len();
    let mut out = Vec::with_capacity(slab.rows.len() * width);
    for row in slab.rows.start..=slab.rows.end {
        let start = row * cols + slab.cols.start;
        out.extend_from_slice(segment(data, start, width)?);
    }
    Ok(out)
}

fn extract_strings(data: &[u8], columns: &StrColumns, slab: &Hyperslab) -> Result<Vec<u8>> {
    let offset = columns.offset_of(slab.cols.start)?;
    let width = columns.slice(slab.cols.start..=slab.cols.end)?.row_width();
    let row_width = columns.row_width();
    let mut out = Vec::with_capacity(slab.rows.len() * width);
    for row in slab.rows.start..=slab.rows.end {
        out.extend_from_slice(segment(data, row * row_width + offset, width)?);
    }
    Ok(out)
}

fn segment<T>(data: &[T], start: usize, len: usize) -> Result<&[T]> {
    data.get(start..start + len).ok_or(Error::BufferTooShort {
        needed: start + len,
        actual: data.len(),
    })
}

/// Row `local` of a row-major buffer with `cols` columns
pub fn row<T: Copy>(data: &[T], cols: usize, local: usize) -> Result<Vec<T>> {
    segment(data, local * cols, cols).map(<[T]>::to_vec)
}

/// Column `local` of a row-major buffer with `rows` rows and `cols` columns
pub fn column<T: Copy>(data: &[T], rows: usize, cols: usize, local: usize) -> Result<Vec<T>> {
    (0..rows)
        .map(|r| {
            data.get(r * cols + local).copied().ok_or(Error::BufferTooShort {
                needed: r * cols + local + 1,
                actual: data.len(),
            })
        })
        .collect()
}

/// Fields of string row `local`, trimmed of padding
pub fn string_row(data: &[u8], columns: &StrColumns, local: usize) -> Result<Vec<String>> {
    let row = segment(data, local * columns.row_width(), columns.row_width())?;
    let mut cursor = 0;
    Ok(columns
        .widths()
        .iter()
        .map(|width| {
            let field = trim_field(&row[cursor..cursor + width]);
            cursor += width;
            field
        })
        .collect())
}

/// Field `local` of every string row, trimmed of padding
pub fn string_column(data: &[u8], columns: &StrColumns, rows: usize, local: usize) -> Result<Vec<String>> {
    let offset = columns.offset_of(local)?;
    let width = columns.width(local)?;
    (0..rows)
        .map(|r| segment(data, r * columns.row_width() + offset, width).map(trim_field))
        .collect()
}

/// Decode a padded field, dropping surrounding whitespace and NUL bytes
pub fn trim_field(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}
