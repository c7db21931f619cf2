//! Transfer-progress records owned by the File Storage Service.
//!
//! FSS is the authority on physical transfer state; the upload engine only
//! reads these shapes and reacts to them.

use serde::{Deserialize, Serialize};

/// State of a physical transfer as reported by FSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FssStatus {
    /// Server discarded partial state; the upload must be re-registered.
    Inactive,
    /// Chunks are being accepted.
    Working,
    /// All chunks are in but finalize has not succeeded yet.
    Retry,
    /// Bytes committed and verified.
    Complete,
    Error,
}

/// Per-chunk acceptance state within an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkStatus {
    Pending,
    Working,
    Complete,
    Error,
}

/// Upload registration metadata sent alongside name and size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUploadMeta {
    pub original_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_ms: Option<i64>,
    /// Ask the backend to ingest the file directly from the shared mount
    /// instead of receiving streamed bytes.
    #[serde(default, skip_serializing_if = "is_false")]
    pub local_nas_shortcut: bool,
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Authoritative transfer-progress record for one upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FssUploadRecord {
    pub upload_id: String,
    pub status: FssStatus,
    pub chunk_size: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunk_statuses: Vec<ChunkStatus>,
    pub current_file_size: i64,
    pub file_size: i64,
}

impl FssUploadRecord {
    /// 1-based numbers of chunks the server has already accepted.
    ///
    /// A resumed transfer must never re-send these.
    pub fn complete_chunks(&self) -> Vec<i32> {
        self.chunk_statuses
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == ChunkStatus::Complete)
            .map(|(i, _)| i as i32 + 1)
            .collect()
    }

    /// Returns `true` once every chunk is accepted.
    pub fn all_chunks_complete(&self) -> bool {
        !self.chunk_statuses.is_empty()
            && self
                .chunk_statuses
                .iter()
                .all(|s| *s == ChunkStatus::Complete)
    }
}

/// Server acknowledgement of one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAck {
    pub upload_id: String,
    pub chunk_number: i32,
}

/// Server-side view of one chunk, readable after acknowledgement.
///
/// `cumulative_md5` covers all bytes through this chunk, in offset order;
/// it is only meaningful once this chunk and every prior one are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkInfo {
    pub chunk_number: i32,
    pub cumulative_md5: String,
    pub size: i64,
    pub status: ChunkStatus,
}

/// Outcome of whole-object verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResult {
    pub error_count: i32,
    pub chunk_number: i32,
    pub upload_id: String,
}

/// Attributes of a committed file, produced after a successful finalize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttributes {
    pub file_id: String,
    pub local_path: String,
    pub name: String,
    pub size: i64,
    pub md5: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(statuses: Vec<ChunkStatus>) -> FssUploadRecord {
        FssUploadRecord {
            upload_id: "fss-1".into(),
            status: FssStatus::Working,
            chunk_size: 1024,
            chunk_statuses: statuses,
            current_file_size: 0,
            file_size: 4096,
        }
    }

    #[test]
    fn fss_status_wire_names() {
        let json = serde_json::to_string(&FssStatus::Inactive).unwrap();
        assert_eq!(json, "\"INACTIVE\"");
        let parsed: FssStatus = serde_json::from_str("\"RETRY\"").unwrap();
        assert_eq!(parsed, FssStatus::Retry);
    }

    #[test]
    fn complete_chunks_are_one_based() {
        let rec = record(vec![
            ChunkStatus::Complete,
            ChunkStatus::Pending,
            ChunkStatus::Complete,
            ChunkStatus::Working,
        ]);
        assert_eq!(rec.complete_chunks(), vec![1, 3]);
        assert!(!rec.all_chunks_complete());
    }

    #[test]
    fn all_complete_requires_nonempty() {
        assert!(!record(vec![]).all_chunks_complete());
        assert!(record(vec![ChunkStatus::Complete; 3]).all_chunks_complete());
    }

    #[test]
    fn record_json_roundtrip() {
        let rec = record(vec![ChunkStatus::Complete, ChunkStatus::Working]);
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"uploadId\":\"fss-1\""));
        let parsed: FssUploadRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, parsed);
    }
}
