//! Caller supplied output buffers
//!
//! Operations returning variable sized data come in two flavours: an owned one and an
//! `*_into` one writing into a caller buffer. The latter never writes partially; a buffer
//! that is too small yields [`Error::ShortBuffer`] with the size needed, so callers can size
//! the buffer and retry.

use crate::{Error, Result};

/// Copy `source` to the front of `target`, or report the required length
pub(crate) fn copy_into<T: Copy>(source: &[T], target: &mut [T]) -> Result<usize> {
    let required = source.len();
    match target.get_mut(..required) {
        Some(dest) => {
            dest.copy_from_slice(source);
            Ok(required)
        }
        None => Err(Error::ShortBuffer { required }),
    }
}
