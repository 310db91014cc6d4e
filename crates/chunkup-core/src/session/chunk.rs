//! Chunk descriptors and the whole-file descriptor sent to the server.

use serde::{Deserialize, Serialize};

/// One contiguous byte range of a file, addressed by index.
///
/// The payload is not stored: `offset` and `current_size` select the bytes
/// from the session's source when the chunk is uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub total_chunks: usize,
    /// Nominal chunk size (every chunk but possibly the last has this size).
    pub chunk_size: u64,
    /// Actual size of this chunk: `min(chunk_size, total_size - index * chunk_size)`.
    pub current_size: u64,
    pub total_size: u64,
    pub filename: String,
    pub relative_path: String,
    /// Hash of the whole file; identical on every chunk of a session.
    pub content_hash: String,
    /// Byte offset of the payload within the source.
    pub offset: u64,
}

impl Chunk {
    /// Every descriptor field except the payload, in wire form.
    ///
    /// Used as the query string of the existence test and as the text
    /// parts of the upload form.
    pub fn fields(&self) -> Vec<(String, String)> {
        vec![
            ("chunkIndex".to_string(), self.index.to_string()),
            ("totalChunks".to_string(), self.total_chunks.to_string()),
            ("chunkSize".to_string(), self.chunk_size.to_string()),
            ("currentSize".to_string(), self.current_size.to_string()),
            ("totalSize".to_string(), self.total_size.to_string()),
            ("filename".to_string(), self.filename.clone()),
            ("contentHash".to_string(), self.content_hash.clone()),
            ("relativePath".to_string(), self.relative_path.clone()),
        ]
    }

    /// The whole-file descriptor carried by this chunk (chunk index stripped).
    pub fn file_information(&self) -> FileInformation {
        FileInformation {
            total_chunks: self.total_chunks,
            chunk_size: self.chunk_size,
            total_size: self.total_size,
            filename: self.filename.clone(),
            content_hash: self.content_hash.clone(),
            relative_path: self.relative_path.clone(),
        }
    }
}

/// JSON body of the precheck and merge requests (before injected fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInformation {
    pub total_chunks: usize,
    pub chunk_size: u64,
    pub total_size: u64,
    pub filename: String,
    pub content_hash: String,
    pub relative_path: String,
}
