use std::path::Path;

use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// MD5 helpers
// ---------------------------------------------------------------------------

/// Computes MD5 of `data` and returns the hex-encoded digest.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Computes MD5 of an entire file and returns the hex-encoded digest.
pub async fn calculate_file_md5(path: &Path) -> Result<String, TransferError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// A chunk of file data ready for dispatch.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 1-based chunk number.
    pub number: i32,
    /// Byte offset within the file.
    pub offset: i64,
    /// Size of this chunk in bytes.
    pub size: usize,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// Hex MD5 of all file bytes through the end of this chunk.
    pub cumulative_md5: String,
}

/// Reads a file in fixed-size chunks, maintaining a cumulative MD5.
///
/// Chunks are produced strictly in offset order and the digest is advanced
/// before a chunk is handed out, so the hash stays correct no matter in
/// which order the caller's network sends complete. Producing the next
/// chunk never waits on the previous one being acknowledged.
pub struct ChunkReader {
    file: tokio::fs::File,
    chunk_size: usize,
    offset: i64,
    file_size: i64,
    next_number: i32,
    digest: Md5,
    final_md5: Option<String>,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len() as i64;
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            file_size,
            next_number: 1,
            digest: Md5::new(),
            final_md5: None,
        })
    }

    /// Reads the next chunk. Returns `None` at EOF.
    ///
    /// A short read (file truncated underneath us) is an error; the caller
    /// must not finalize the upload after one.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let remaining = self.file_size - self.offset;
        if remaining <= 0 {
            if self.final_md5.is_none() {
                self.final_md5 = Some(hex::encode(self.digest.clone().finalize()));
            }
            return Ok(None);
        }

        let read_size = std::cmp::min(remaining as usize, self.chunk_size);
        let mut buf = vec![0u8; read_size];
        self.file.read_exact(&mut buf).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TransferError::SourceChanged(format!(
                    "expected {read_size} bytes at offset {}",
                    self.offset
                ))
            } else {
                TransferError::Io(e)
            }
        })?;

        self.digest.update(&buf);
        let cumulative_md5 = hex::encode(self.digest.clone().finalize());

        let chunk = Chunk {
            number: self.next_number,
            offset: self.offset,
            size: read_size,
            data: buf,
            cumulative_md5: cumulative_md5.clone(),
        };
        self.offset += read_size as i64;
        self.next_number += 1;
        if self.offset >= self.file_size {
            self.final_md5 = Some(cumulative_md5);
        }
        Ok(Some(chunk))
    }

    /// Hex MD5 of the whole file, available once EOF was reached.
    pub fn final_md5(&self) -> Option<&str> {
        self.final_md5.as_deref()
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> i64 {
        self.file_size
    }

    /// Current byte offset.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Total number of chunks this file splits into.
    pub fn chunk_count(&self) -> i32 {
        if self.file_size == 0 {
            return 0;
        }
        ((self.file_size + self.chunk_size as i64 - 1) / self.chunk_size as i64) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn md5_hex_known_value() {
        // RFC 1321 test vector.
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[tokio::test]
    async fn file_md5_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"content for hashing";
        let path = create_test_file(dir.path(), "test.bin", data);

        let file_md5 = calculate_file_md5(&path).await.unwrap();
        assert_eq!(file_md5, md5_hex(data));
    }

    #[tokio::test]
    async fn reads_all_chunks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"AABBCCDDEE"; // 10 bytes.
        let path = create_test_file(dir.path(), "test.bin", data);

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert_eq!(reader.file_size(), 10);
        assert_eq!(reader.chunk_count(), 3);

        let c1 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c1.number, 1);
        assert_eq!(c1.offset, 0);
        assert_eq!(&c1.data, b"AABB");
        assert_eq!(c1.cumulative_md5, md5_hex(b"AABB"));

        let c2 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c2.number, 2);
        assert_eq!(c2.offset, 4);
        assert_eq!(c2.cumulative_md5, md5_hex(b"AABBCCDD"));

        let c3 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c3.number, 3);
        assert_eq!(c3.size, 2);
        assert_eq!(c3.cumulative_md5, md5_hex(data));

        assert!(reader.next_chunk().await.unwrap().is_none());
        assert_eq!(reader.final_md5(), Some(md5_hex(data).as_str()));
    }

    #[tokio::test]
    async fn final_md5_equals_whole_file_hash() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let path = create_test_file(dir.path(), "big.bin", &data);

        let mut reader = ChunkReader::open(&path, 1024).await.unwrap();
        while reader.next_chunk().await.unwrap().is_some() {}

        let whole = calculate_file_md5(&path).await.unwrap();
        assert_eq!(reader.final_md5(), Some(whole.as_str()));
    }

    #[tokio::test]
    async fn last_cumulative_equals_final() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"0123456789";
        let path = create_test_file(dir.path(), "test.bin", data);

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        let mut last = String::new();
        while let Some(chunk) = reader.next_chunk().await.unwrap() {
            last = chunk.cumulative_md5;
        }
        assert_eq!(reader.final_md5(), Some(last.as_str()));
    }

    #[tokio::test]
    async fn empty_file_yields_no_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_test_file(dir.path(), "empty.bin", b"");

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert!(reader.next_chunk().await.unwrap().is_none());
        assert_eq!(reader.chunk_count(), 0);
        // MD5 of zero bytes.
        assert_eq!(reader.final_md5(), Some("d41d8cd98f00b204e9800998ecf8427e"));
    }

    #[tokio::test]
    async fn default_chunk_size_applies() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_test_file(dir.path(), "one.bin", b"x");
        let reader = ChunkReader::open(&path, 0).await.unwrap();
        assert_eq!(reader.chunk_count(), 1);
    }

    #[tokio::test]
    async fn truncated_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_test_file(dir.path(), "shrink.bin", &vec![7u8; 8192]);

        let mut reader = ChunkReader::open(&path, 4096).await.unwrap();
        let _ = reader.next_chunk().await.unwrap().unwrap();

        // Truncate underneath the reader.
        std::fs::write(&path, b"").unwrap();

        let result = reader.next_chunk().await;
        assert!(matches!(result, Err(TransferError::SourceChanged(_))));
        assert!(reader.final_md5().is_none());
    }

    #[tokio::test]
    async fn missing_file_rejects_open() {
        let dir = tempfile::tempdir().unwrap();
        let result = ChunkReader::open(&dir.path().join("nope.bin"), 4).await;
        assert!(matches!(result, Err(TransferError::Io(_))));
    }
}
