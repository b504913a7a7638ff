//! The stored buffer.
//!
//! A single byte region that is either absent or present with a fixed
//! length. It is created and replaced only by `reset`; reads and writes go
//! through one range-checked accessor and never change its length.

use std::fmt;
use std::ops::Range;
use tracing::trace;

/// Server-wide byte buffer.
#[derive(Debug, Default)]
pub struct Storage {
    data: Option<Vec<u8>>,
}

impl Storage {
    pub fn new() -> Self {
        Self { data: None }
    }

    /// Whether a reset has ever allocated the buffer.
    pub fn is_present(&self) -> bool {
        self.data.is_some()
    }

    /// Stored length, 0 when absent.
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contents(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Replace the buffer with a fresh copy of `src`.
    pub fn reset(&mut self, src: &[u8]) {
        let previous = self.data.replace(src.to_vec());
        trace!(
            previous_len = previous.map(|d| d.len()),
            len = src.len(),
            "Stored buffer replaced"
        );
    }

    /// Borrow `length` bytes starting at `offset`.
    pub fn read(&self, offset: u64, length: u64) -> Result<&[u8], StorageError> {
        let data = self.data.as_deref().ok_or(StorageError::Absent)?;
        let range = checked_range(offset, length, data.len())?;
        Ok(&data[range])
    }

    /// Copy `src` into the buffer starting at `offset`. On error the
    /// buffer is left untouched.
    pub fn write(&mut self, offset: u64, src: &[u8]) -> Result<(), StorageError> {
        let data = self.data.as_deref_mut().ok_or(StorageError::Absent)?;
        let range = checked_range(offset, src.len() as u64, data.len())?;
        data[range].copy_from_slice(src);
        Ok(())
    }
}

/// The one place offsets are validated against the stored length.
fn checked_range(offset: u64, length: u64, stored: usize) -> Result<Range<usize>, StorageError> {
    let out_of_bounds = StorageError::OutOfBounds {
        offset,
        length,
        stored: stored as u64,
    };

    let end = offset.checked_add(length).ok_or(out_of_bounds.clone())?;
    if end > stored as u64 {
        return Err(out_of_bounds);
    }

    // end <= stored, so both fit in usize
    Ok(offset as usize..end as usize)
}

/// Storage access errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No reset has allocated the buffer yet.
    Absent,
    /// The requested range falls outside the buffer or overflows.
    OutOfBounds { offset: u64, length: u64, stored: u64 },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Absent => write!(f, "stored buffer has not been allocated"),
            StorageError::OutOfBounds {
                offset,
                length,
                stored,
            } => write!(
                f,
                "range offset={:#x} length={:#x} outside stored buffer of {:#x} bytes",
                offset, length, stored
            ),
        }
    }
}

impl std::error::Error for StorageError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_by_default() {
        let storage = Storage::new();
        assert!(!storage.is_present());
        assert_eq!(storage.len(), 0);
        assert_eq!(storage.read(0, 0), Err(StorageError::Absent));
    }

    #[test]
    fn test_reset_then_read() {
        let mut storage = Storage::new();
        storage.reset(&[1, 2, 3, 4, 5]);

        assert_eq!(storage.len(), 5);
        assert_eq!(storage.read(1, 3).unwrap(), &[2, 3, 4]);
        assert_eq!(storage.read(0, 5).unwrap(), &[1, 2, 3, 4, 5]);
        assert_eq!(storage.read(5, 0).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn test_reset_replaces_length() {
        let mut storage = Storage::new();
        storage.reset(&[1, 2, 3, 4, 5]);
        storage.reset(&[7]);
        assert_eq!(storage.contents(), Some(&[7u8][..]));

        storage.reset(&[]);
        assert!(storage.is_present());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_write_in_bounds() {
        let mut storage = Storage::new();
        storage.reset(&[1, 2, 3, 4, 5]);
        storage.write(0, &[9, 9]).unwrap();
        assert_eq!(storage.contents().unwrap(), &[9, 9, 3, 4, 5]);
    }

    #[test]
    fn test_write_out_of_bounds_leaves_buffer() {
        let mut storage = Storage::new();
        storage.reset(&[1, 2, 3, 4, 5]);

        let err = storage.write(4, &[9, 9]).unwrap_err();
        assert_eq!(
            err,
            StorageError::OutOfBounds {
                offset: 4,
                length: 2,
                stored: 5
            }
        );
        assert_eq!(storage.contents().unwrap(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_overflowing_range() {
        let mut storage = Storage::new();
        storage.reset(&[1, 2, 3, 4, 5]);

        assert!(matches!(
            storage.read(u64::MAX, 2),
            Err(StorageError::OutOfBounds { .. })
        ));
        assert!(storage.write(u64::MAX - 1, &[0, 0, 0]).is_err());
    }

    #[test]
    fn test_write_absent() {
        let mut storage = Storage::new();
        assert_eq!(storage.write(0, &[1]), Err(StorageError::Absent));
    }
}
