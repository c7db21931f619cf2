//! Shared data types exchanged with the File Storage Service (FSS) and the
//! Job Status Service (JSS).
//!
//! The upload engine consumes both services through traits; these are the
//! request/response shapes those traits speak. Wire transport is out of
//! scope here.

mod jobs;
mod storage;

pub use jobs::{JobPatch, JobSpec, JobStatus, UploadFileSpec, UploadJob};
pub use storage::{
    ChunkAck, ChunkInfo, ChunkStatus, FileAttributes, FinalizeResult, FssStatus, FssUploadRecord,
    RegisterUploadMeta,
};
