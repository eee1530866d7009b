//! Where the bytes of a simulated file come from.

use std::io::{self, Cursor, SeekFrom};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use undertow_core::swarm::BoxedReader;

/// Backing content of one simulated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Bytes held in memory
    Memory(Bytes),
    /// A file on the local disk, opened on every stream
    Disk { path: PathBuf, length: u64 },
    /// Deterministic generated bytes, see [`pattern_byte`]
    Pattern { length: u64 },
}

impl FileSource {
    pub fn length(&self) -> u64 {
        match self {
            FileSource::Memory(bytes) => bytes.len() as u64,
            FileSource::Disk { length, .. } | FileSource::Pattern { length } => *length,
        }
    }

    /// Opens a fresh seekable reader positioned at offset zero.
    ///
    /// # Errors
    /// - `io::Error` - Disk-backed file could not be opened
    pub async fn open(&self) -> io::Result<BoxedReader> {
        Ok(match self {
            FileSource::Memory(bytes) => Box::new(Cursor::new(bytes.clone())),
            FileSource::Disk { path, .. } => Box::new(tokio::fs::File::open(path).await?),
            FileSource::Pattern { length } => Box::new(PatternReader::new(*length)),
        })
    }
}

/// Byte stored at `offset` of every pattern-backed file.
pub fn pattern_byte(offset: u64) -> u8 {
    (offset % 251) as u8
}

/// Reader over [`FileSource::Pattern`] content without allocating it.
#[derive(Debug)]
pub struct PatternReader {
    length: u64,
    position: u64,
}

impl PatternReader {
    pub fn new(length: u64) -> Self {
        Self {
            length,
            position: 0,
        }
    }
}

impl AsyncRead for PatternReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let remaining = self.length.saturating_sub(self.position);
        let count = remaining.min(buf.remaining() as u64);

        let start = self.position;
        let chunk: Vec<u8> = (start..start + count).map(pattern_byte).collect();
        buf.put_slice(&chunk);
        self.position += count;

        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for PatternReader {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let target = match position {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.length.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };

        self.position = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.position))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    use super::*;

    #[tokio::test]
    async fn test_pattern_reader_seek_and_read() {
        let mut reader = FileSource::Pattern { length: 1000 }.open().await.unwrap();
        reader.seek(SeekFrom::Start(500)).await.unwrap();

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();

        assert_eq!(buf.len(), 500);
        assert_eq!(buf[0], pattern_byte(500));
        assert_eq!(buf[499], pattern_byte(999));
    }

    #[tokio::test]
    async fn test_disk_source_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        let source = FileSource::Disk {
            path,
            length: 10,
        };
        let mut reader = source.open().await.unwrap();
        reader.seek(SeekFrom::End(-3)).await.unwrap();

        let mut buf = String::new();
        reader.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "789");
    }

    #[tokio::test]
    async fn test_seek_before_start_fails() {
        let mut reader = PatternReader::new(10);
        assert!(reader.seek(SeekFrom::Current(-1)).await.is_err());
    }
}
