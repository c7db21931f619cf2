//! Progress events emitted during an upload.

/// Event stream surfaced to the UI layer via [`take_events`].
///
/// [`take_events`]: crate::UploadOrchestrator::take_events
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Bytes acknowledged so far for one file.
    Progress {
        job_id: String,
        original_path: String,
        transferred_bytes: i64,
        total_bytes: i64,
    },
    /// One file finished finalize and metadata creation.
    FileCommitted {
        job_id: String,
        original_path: String,
        file_id: String,
    },
    /// Every file of the job succeeded.
    Completed { job_id: String },
    /// The job failed or was cancelled; `error` is the human-readable
    /// message also written to the job record.
    Failed { job_id: String, error: String },
}
