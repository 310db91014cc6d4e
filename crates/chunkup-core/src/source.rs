//! The opaque file handle an upload session is built from.
//!
//! A source is either a file on disk (read lazily, one byte range at a time)
//! or an in-memory buffer. Chunks never own their bytes; they carry an offset
//! and length into the source.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

#[derive(Debug, Clone)]
enum Backing {
    Disk(PathBuf),
    Memory(Arc<[u8]>),
}

/// A file accepted for upload.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    relative_path: String,
    size: u64,
    backing: Backing,
}

impl SourceFile {
    /// Open a file on disk. The name is the final path component; the
    /// relative path is empty (set it with [`with_relative_path`](Self::with_relative_path)
    /// when uploading a directory tree).
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            name,
            relative_path: String::new(),
            size: meta.len(),
            backing: Backing::Disk(path.to_path_buf()),
        })
    }

    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            relative_path: String::new(),
            size: bytes.len() as u64,
            backing: Backing::Memory(bytes),
        }
    }

    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = relative_path.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the file inside an uploaded directory (empty for single files).
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read exactly `len` bytes starting at `offset`.
    pub async fn read_range(&self, offset: u64, len: u64) -> std::io::Result<Vec<u8>> {
        let end = offset.checked_add(len).filter(|end| *end <= self.size);
        if end.is_none() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "range {}+{} outside source of {} bytes",
                    offset, len, self.size
                ),
            ));
        }
        match &self.backing {
            Backing::Memory(bytes) => Ok(bytes[offset as usize..(offset + len) as usize].to_vec()),
            Backing::Disk(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(offset)).await?;
                let mut buf = vec![0u8; len as usize];
                file.read_exact(&mut buf).await?;
                Ok(buf)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn memory_read_range() {
        let src = SourceFile::from_bytes("a.bin", b"0123456789".to_vec());
        assert_eq!(src.size(), 10);
        assert_eq!(src.read_range(3, 4).await.unwrap(), b"3456");
        assert!(src.read_range(8, 4).await.is_err());
    }

    #[tokio::test]
    async fn disk_read_range() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello chunked world").unwrap();
        f.flush().unwrap();
        let src = SourceFile::open(f.path()).await.unwrap();
        assert_eq!(src.size(), 19);
        assert_eq!(src.read_range(6, 7).await.unwrap(), b"chunked");
    }

    #[tokio::test]
    async fn disk_read_fails_after_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.bin");
        std::fs::write(&path, b"data").unwrap();
        let src = SourceFile::open(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(src.read_range(0, 4).await.is_err());
    }

    #[tokio::test]
    async fn open_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SourceFile::open(dir.path()).await.is_err());
    }

    #[test]
    fn relative_path_is_kept() {
        let src = SourceFile::from_bytes("a.txt", b"x".to_vec()).with_relative_path("docs/a.txt");
        assert_eq!(src.relative_path(), "docs/a.txt");
        assert_eq!(src.name(), "a.txt");
    }
}
