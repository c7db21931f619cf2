//! Upload engine error types.

/// Errors produced while orchestrating an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("read error: {0}")]
    Read(#[from] biofile_transfer::TransferError),

    #[error("storage service error: {0}")]
    Storage(String),

    #[error("job service error: {0}")]
    JobTracker(String),

    #[error("metadata creation failed: {0}")]
    Metadata(String),

    #[error("finalize failed for upload {upload_id}: {error_count} chunk error(s)")]
    Finalize { upload_id: String, error_count: i32 },

    #[error("file already exists in FMS: {0}")]
    DuplicateFile(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("upload cancelled")]
    Cancelled,

    #[error("{0}")]
    InvalidJobState(String),

    #[error("chunk task failed: {0}")]
    ChunkTask(String),
}

impl UploadError {
    /// Returns `true` for user-initiated cancellation, as opposed to a
    /// genuine failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }
}
