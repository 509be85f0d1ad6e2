//! Content construction for new versions
//!
//! A version is always a complete copy of the file. These helpers build the
//! next content from the previous one without touching storage.

use verfs_common::{Error, Result};

/// Overlay `data` on `old` at `offset`
///
/// Bytes of `old` outside the written range are kept. Writing past the end
/// extends the content, and any gap between the old end and `offset` is
/// zero-filled.
pub(crate) fn patch(old: &[u8], offset: u64, data: &[u8], max_size: u64) -> Result<Vec<u8>> {
    let end = offset
        .checked_add(data.len() as u64)
        .ok_or(Error::FileTooLarge {
            size: u64::MAX,
            max_size,
        })?;
    let new_len = end.max(old.len() as u64);

    let mut buf = zeroed(new_len, max_size)?;
    buf[..old.len()].copy_from_slice(old);
    // new_len fits in usize, so offset does too
    let start = usize::try_from(offset).map_err(|_| Error::OutOfMemory { size: new_len })?;
    buf[start..start + data.len()].copy_from_slice(data);
    Ok(buf)
}

/// Cut `old` down or zero-extend it to exactly `size` bytes
pub(crate) fn resize(old: &[u8], size: u64, max_size: u64) -> Result<Vec<u8>> {
    let mut buf = zeroed(size, max_size)?;
    let keep = buf.len().min(old.len());
    buf[..keep].copy_from_slice(&old[..keep]);
    Ok(buf)
}

fn zeroed(len: u64, max_size: u64) -> Result<Vec<u8>> {
    if len > max_size {
        return Err(Error::FileTooLarge {
            size: len,
            max_size,
        });
    }
    let capacity = usize::try_from(len).map_err(|_| Error::OutOfMemory { size: len })?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(capacity)
        .map_err(|e| Error::out_of_memory(len, e))?;
    buf.resize(capacity, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u64 = 1024;

    #[test]
    fn test_patch_overlays_in_place() {
        let out = patch(b"ABCDEFGH", 2, b"xy", MAX).unwrap();
        assert_eq!(out, b"ABxyEFGH");
    }

    #[test]
    fn test_patch_preserves_tail() {
        // "AB" at 0 over "HELLO" keeps the last three bytes
        let out = patch(b"HELLO", 0, b"AB", MAX).unwrap();
        assert_eq!(out, b"ABLLO");
    }

    #[test]
    fn test_patch_extends() {
        let out = patch(b"abc", 2, b"XYZ", MAX).unwrap();
        assert_eq!(out, b"abXYZ");
    }

    #[test]
    fn test_patch_zero_fills_gap() {
        let out = patch(b"ab", 5, b"z", MAX).unwrap();
        assert_eq!(out, b"ab\0\0\0z");
        let out = patch(b"", 3, b"q", MAX).unwrap();
        assert_eq!(out, b"\0\0\0q");
    }

    #[test]
    fn test_patch_empty_data() {
        assert_eq!(patch(b"abc", 1, b"", MAX).unwrap(), b"abc");
        // An empty write past the end still extends
        assert_eq!(patch(b"abc", 5, b"", MAX).unwrap(), b"abc\0\0");
    }

    #[test]
    fn test_patch_limits() {
        let err = patch(b"", MAX, b"x", MAX).unwrap_err();
        assert!(matches!(err, Error::FileTooLarge { size, .. } if size == MAX + 1));

        let err = patch(b"", u64::MAX, b"xy", MAX).unwrap_err();
        assert!(matches!(err, Error::FileTooLarge { .. }));

        assert_eq!(patch(b"", MAX - 1, b"x", MAX).unwrap().len() as u64, MAX);
    }

    #[test]
    fn test_resize() {
        assert_eq!(resize(b"hello", 2, MAX).unwrap(), b"he");
        assert_eq!(resize(b"hi", 4, MAX).unwrap(), b"hi\0\0");
        assert!(resize(b"hi", 0, MAX).unwrap().is_empty());
        assert!(matches!(
            resize(b"", MAX + 1, MAX).unwrap_err(),
            Error::FileTooLarge { .. }
        ));
    }
}
