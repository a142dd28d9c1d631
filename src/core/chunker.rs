use crate::utils::error::{ClassifyError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 150;

/// Splits `items` into contiguous batches of `batch_size`; the last one may be shorter.
///
/// The returned iterator borrows `items` and yields nothing for an empty slice.
pub fn chunk<T>(items: &[T], batch_size: usize) -> Result<std::slice::Chunks<'_, T>> {
    if batch_size == 0 {
        return Err(ClassifyError::InvalidConfigValueError {
            field: "batch_size".to_string(),
            value: batch_size.to_string(),
            reason: "Batch size must be positive".to_string(),
        });
    }
    Ok(items.chunks(batch_size))
}

pub fn batch_count(len: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        0
    } else {
        len.div_ceil(batch_size)
    }
}
