//! Chunked local-file reading and upload path classification.
//!
//! The reader splits a source file into fixed-size chunks while folding
//! every byte, in offset order, into a running MD5. The classifier decides
//! whether a path can skip byte streaming entirely because the storage
//! backend reaches the same network mount.

mod chunked;
mod paths;

pub use chunked::{Chunk, ChunkReader, calculate_file_md5, md5_hex};
pub use paths::{NasShortcutConfig, posix_path};

/// Fallback chunk size when the storage service does not assign one: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Errors produced while reading a source file.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source file changed size during read: {0}")]
    SourceChanged(String),
}
