//! Memory-mapped access to dataset files

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};

use crate::error::{Error, Result};

/// Read-only memory-mapped file
pub struct MemoryMappedFile {
    mmap: Mmap,
    path: PathBuf,
}

impl MemoryMappedFile {
    /// Open a file for memory-mapped reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;

        // SAFETY: the mapping is read-only and dataset files are not
        // rewritten while a reader holds them open.
        #[allow(unsafe_code)]
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        Ok(Self { mmap, path })
    }

    /// Whole file contents
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    /// `length` bytes starting at `offset`
    pub fn slice(&self, offset: usize, length: usize) -> Result<&[u8]> {
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= self.mmap.len())
            .ok_or(Error::BufferTooShort {
                needed: offset.saturating_add(length),
                actual: self.mmap.len(),
            })?;
        Ok(&self.mmap[offset..end])
    }

    /// Path the file was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the file in bytes
    pub fn size(&self) -> usize {
        self.mmap.len()
    }
}

impl std::fmt::Debug for MemoryMappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMappedFile")
            .field("path", &self.path)
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_slice_bounds() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3, 4, 5, 6]).unwrap();
        file.flush().unwrap();

        let mapped = MemoryMappedFile::open(file.path()).unwrap();
        assert_eq!(mapped.size(), 6);
        assert_eq!(mapped.slice(2, 3).unwrap(), &[3, 4, 5]);
        assert!(matches!(
            mapped.slice(4, 3),
            Err(Error::BufferTooShort { needed: 7, actual: 6 })
        ));
        assert!(mapped.slice(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MemoryMappedFile::open(dir.path().join("absent.raw")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
