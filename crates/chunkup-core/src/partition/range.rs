//! Chunk range math.

/// Byte range of one chunk: `[offset, offset + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: usize,
    pub offset: u64,
    pub len: u64,
}

/// Number of chunks for a file: `ceil(total_size / chunk_size)`.
///
/// Returns 0 if `total_size` or `chunk_size` is 0.
pub fn chunk_count(total_size: u64, chunk_size: u64) -> usize {
    if total_size == 0 || chunk_size == 0 {
        return 0;
    }
    total_size.div_ceil(chunk_size) as usize
}

/// Fixed-size chunk plan: every chunk is `chunk_size` bytes except possibly
/// the last, which holds the remainder.
pub fn plan_chunks(total_size: u64, chunk_size: u64) -> Vec<ChunkRange> {
    (0..chunk_count(total_size, chunk_size))
        .map(|index| {
            let offset = index as u64 * chunk_size;
            ChunkRange {
                index,
                offset,
                len: chunk_size.min(total_size - offset),
            }
        })
        .collect()
}
