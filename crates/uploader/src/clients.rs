//! Consumed service ports.
//!
//! The orchestrator talks to the File Storage Service (FSS), the Job
//! Status Service (JSS), and the metadata service (MMS) through these
//! traits. Wire transport, timeouts, and backoff live behind the
//! implementations; tests run against in-memory fakes.

use std::future::Future;
use std::pin::Pin;

use biofile_protocol::{
    ChunkAck, ChunkInfo, FileAttributes, FinalizeResult, FssUploadRecord, JobPatch, JobSpec,
    RegisterUploadMeta, UploadJob,
};

use crate::error::UploadError;

/// Boxed future returned by port methods.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// Client port for the File Storage Service.
///
/// FSS owns physical transfer state. Chunk sends may be acknowledged out
/// of order at the transport layer; callers are responsible for hashing
/// bytes in offset order before dispatch.
pub trait StorageClient: Send + Sync {
    /// Registers a new upload and returns its record, including the
    /// server-assigned chunk size.
    fn register_upload(
        &self,
        name: &str,
        size: i64,
        meta: &RegisterUploadMeta,
    ) -> ClientFuture<'_, FssUploadRecord>;

    /// Sends one chunk. `cumulative_md5` covers all file bytes through the
    /// end of this chunk.
    fn send_upload_chunk(
        &self,
        upload_id: &str,
        chunk_number: i32,
        data: Vec<u8>,
        cumulative_md5: &str,
    ) -> ClientFuture<'_, ChunkAck>;

    /// Reads the authoritative transfer record.
    fn get_status(&self, upload_id: &str) -> ClientFuture<'_, FssUploadRecord>;

    /// Reads the server-side view of one chunk.
    fn get_chunk_info(&self, upload_id: &str, chunk_number: i32) -> ClientFuture<'_, ChunkInfo>;

    /// Triggers whole-object verification. `md5` is `None` for local NAS
    /// shortcut uploads, where the backend hashed the file itself.
    fn finalize(&self, upload_id: &str, md5: Option<&str>) -> ClientFuture<'_, FinalizeResult>;

    /// Re-runs a failed finalize using a previously recorded digest.
    fn retry_finalize_md5(&self, upload_id: &str, md5: &str) -> ClientFuture<'_, FinalizeResult>;

    /// Re-runs a failed finalize for a NAS shortcut upload (carries no MD5).
    fn retry_finalize_nas_shortcut(&self, upload_id: &str) -> ClientFuture<'_, FinalizeResult>;

    /// Tells the server to stop expecting further chunks.
    fn cancel_upload(&self, upload_id: &str) -> ClientFuture<'_, ()>;

    /// Duplicate pre-check against files already committed to FMS.
    fn file_exists_by_name_and_size(&self, name: &str, size: i64) -> ClientFuture<'_, bool>;

    /// Attributes of the committed file, valid after a successful finalize.
    fn get_file_attributes(&self, upload_id: &str) -> ClientFuture<'_, FileAttributes>;
}

/// Client port for the Job Status Service.
pub trait JobClient: Send + Sync {
    fn create_job(&self, spec: &JobSpec) -> ClientFuture<'_, UploadJob>;

    fn get_job(&self, job_id: &str) -> ClientFuture<'_, UploadJob>;

    fn update_job(&self, job_id: &str, patch: &JobPatch) -> ClientFuture<'_, ()>;
}

/// Client port for metadata creation, invoked once per committed file.
pub trait MetadataClient: Send + Sync {
    fn create_file_metadata(&self, job_id: &str, file_id: &str) -> ClientFuture<'_, ()>;
}
