//! Chunk partitioning and content hashing.
//!
//! Splits a source into fixed-size chunks and hashes the whole file in one
//! pass, one chunk per scheduling quantum: after each chunk the pass yields
//! back to the runtime so other tasks on the same thread keep running.
//! Results are published into the session only once the hash is final.

mod hash;
mod range;

pub use hash::{content_hash, ContentHasher};
pub use range::{chunk_count, plan_chunks, ChunkRange};

use crate::session::{Chunk, UploadSession};

/// Errors from the partition pass. No partial chunk list is ever published.
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    #[error("file {0:?} is empty")]
    EmptyFile(String),
    #[error("read chunk {index} of {filename:?}: {source}")]
    Read {
        filename: String,
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Partition `session`'s source into `chunk_size` chunks and hash it.
///
/// On success the chunk list (every chunk carrying the final hash), the hash
/// and an all-zero loaded-bytes vector are written into the session together.
/// On error the session is left untouched.
pub async fn partition_session(
    session: &UploadSession,
    chunk_size: u64,
) -> Result<(), PartitionError> {
    let source = session.source();
    if chunk_size == 0 {
        return Err(PartitionError::InvalidChunkSize);
    }
    if source.size() == 0 {
        return Err(PartitionError::EmptyFile(source.name().to_string()));
    }

    let plan = plan_chunks(source.size(), chunk_size);
    let total_chunks = plan.len();
    let mut hasher = ContentHasher::new();
    let mut chunks = Vec::with_capacity(total_chunks);

    for range in plan {
        let bytes = source
            .read_range(range.offset, range.len)
            .await
            .map_err(|e| PartitionError::Read {
                filename: source.name().to_string(),
                index: range.index,
                source: e,
            })?;
        hasher.update(&bytes);
        chunks.push(Chunk {
            index: range.index,
            total_chunks,
            chunk_size,
            current_size: range.len,
            total_size: source.size(),
            filename: source.name().to_string(),
            relative_path: source.relative_path().to_string(),
            content_hash: String::new(),
            offset: range.offset,
        });
        tokio::task::yield_now().await;
    }

    let hash = hasher.finalize();
    for chunk in &mut chunks {
        chunk.content_hash.clone_from(&hash);
    }
    tracing::debug!(
        session = %session.id(),
        file = source.name(),
        chunks = total_chunks,
        hash = %hash,
        "partition complete"
    );
    session.publish_partition(chunks, hash);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceFile;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn body(len: usize) -> Vec<u8> {
        (0u8..251).cycle().take(len).collect()
    }

    #[tokio::test]
    async fn partition_publishes_chunks_and_hash() {
        let data = body(10);
        let session = UploadSession::new(SourceFile::from_bytes("ten.bin", data.clone()));
        partition_session(&session, 4).await.unwrap();

        let chunks = session.chunks();
        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks.iter().map(|c| c.current_size).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
        assert!(chunks.iter().all(|c| c.total_chunks == 3 && c.total_size == 10));
        let hash = session.content_hash();
        assert_eq!(hash, content_hash(&data));
        assert!(chunks.iter().all(|c| c.content_hash == hash));
        assert_eq!(session.loaded_bytes(), vec![0, 0, 0]);
    }

    #[tokio::test]
    async fn hash_is_deterministic_and_independent_of_chunk_size() {
        let data = body(1000);
        let mut hashes = Vec::new();
        for chunk_size in [3u64, 64, 999, 4096] {
            let session = UploadSession::new(SourceFile::from_bytes("d.bin", data.clone()));
            partition_session(&session, chunk_size).await.unwrap();
            hashes.push(session.content_hash());
        }
        assert!(hashes.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn hash_depends_on_chunk_order() {
        let data = body(12);
        let session = UploadSession::new(SourceFile::from_bytes("o.bin", data.clone()));
        partition_session(&session, 4).await.unwrap();

        let mut reversed = ContentHasher::new();
        for chunk in data.chunks(4).rev() {
            reversed.update(chunk);
        }
        assert_ne!(session.content_hash(), reversed.finalize());
    }

    #[tokio::test]
    async fn empty_file_is_rejected() {
        let session = UploadSession::new(SourceFile::from_bytes("empty.bin", Vec::new()));
        let err = partition_session(&session, 4).await.unwrap_err();
        assert!(matches!(err, PartitionError::EmptyFile(_)));
    }

    #[tokio::test]
    async fn zero_chunk_size_is_rejected() {
        let session = UploadSession::new(SourceFile::from_bytes("a.bin", vec![1, 2, 3]));
        let err = partition_session(&session, 0).await.unwrap_err();
        assert!(matches!(err, PartitionError::InvalidChunkSize));
    }

    #[tokio::test]
    async fn read_failure_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vanishing.bin");
        std::fs::write(&path, body(64)).unwrap();
        let source = SourceFile::open(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        let session = UploadSession::new(source);
        let err = partition_session(&session, 16).await.unwrap_err();
        assert!(matches!(err, PartitionError::Read { index: 0, .. }));
        assert_eq!(session.chunk_count(), 0);
        assert!(session.content_hash().is_empty());
    }

    #[tokio::test]
    async fn partition_yields_between_chunks() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicBool::new(false));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                while !done.load(Ordering::Relaxed) {
                    ticks.fetch_add(1, Ordering::Relaxed);
                    tokio::task::yield_now().await;
                }
            })
        };

        let session = UploadSession::new(SourceFile::from_bytes("many.bin", body(64)));
        partition_session(&session, 1).await.unwrap();
        let observed = ticks.load(Ordering::Relaxed);
        done.store(true, Ordering::Relaxed);
        ticker.await.unwrap();

        assert_eq!(session.chunk_count(), 64);
        assert!(observed > 0, "other tasks must run during the pass");
    }

    #[tokio::test]
    async fn disk_source_matches_memory_source() {
        let data = body(5000);
        let mut f = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut f, &data).unwrap();
        let disk = UploadSession::new(SourceFile::open(f.path()).await.unwrap());
        partition_session(&disk, 1024).await.unwrap();
        assert_eq!(disk.chunk_count(), 5);
        assert_eq!(disk.content_hash(), content_hash(&data));
    }
}
