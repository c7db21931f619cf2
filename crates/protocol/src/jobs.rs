//! Logical upload job records, tracked by the Job Status Service.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an upload job.
///
/// JSS tracks jobs independently of chunk transfer; the upload engine is
/// the only writer of this status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    Working,
    Retrying,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Returns `true` for states no transfer can leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// One file wrapped by a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileSpec {
    pub original_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_type: String,
}

/// Request shape for creating a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub name: String,
    pub files: Vec<UploadFileSpec>,
}

/// A logical upload job.
///
/// One job may wrap multiple files (legacy fan-out); each file gets its own
/// FSS upload id, recorded in `fss_upload_ids` keyed by original path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadJob {
    pub id: String,
    pub name: String,
    pub status: JobStatus,
    pub files: Vec<UploadFileSpec>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fss_upload_ids: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub local_nas_shortcut: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl UploadJob {
    /// Returns the FSS upload id recorded for `original_path`, if any.
    pub fn fss_upload_id_for(&self, original_path: &str) -> Option<&str> {
        self.fss_upload_ids.get(original_path).map(String::as_str)
    }

    /// Returns `true` once any file of this job has a registered transfer.
    pub fn has_transfer_state(&self) -> bool {
        !self.fss_upload_ids.is_empty()
    }
}

/// Partial update applied to a job via the Job Status Service.
///
/// Only populated fields are written; everything else is left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fss_upload_ids: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_nas_shortcut: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobPatch {
    /// Patch that only moves the job to `status`.
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch that fails the job with a human-readable error.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Applies this patch to a job record in place.
    pub fn apply_to(&self, job: &mut UploadJob) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(ref ids) = self.fss_upload_ids {
            job.fss_upload_ids.extend(ids.clone());
        }
        if let Some(ms) = self.last_modified_ms {
            job.last_modified_ms = Some(ms);
        }
        if let Some(nas) = self.local_nas_shortcut {
            job.local_nas_shortcut = nas;
        }
        if let Some(cancelled) = self.cancelled {
            job.cancelled = cancelled;
        }
        if let Some(ref error) = self.error {
            job.error = Some(error.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> UploadJob {
        UploadJob {
            id: "job-1".into(),
            name: "upload test.czi".into(),
            status: JobStatus::Created,
            files: vec![UploadFileSpec {
                original_path: "/allen/aics/foo/test.czi".into(),
                file_type: "czi".into(),
            }],
            fss_upload_ids: HashMap::new(),
            last_modified_ms: None,
            local_nas_shortcut: false,
            cancelled: false,
            error: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn status_wire_names() {
        let json = serde_json::to_string(&JobStatus::Succeeded).unwrap();
        assert_eq!(json, "\"SUCCEEDED\"");
        let parsed: JobStatus = serde_json::from_str("\"WORKING\"").unwrap();
        assert_eq!(parsed, JobStatus::Working);
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Working.is_terminal());
        assert!(!JobStatus::Retrying.is_terminal());
    }

    #[test]
    fn job_json_omits_empty_fields() {
        let job = sample_job();
        let json = serde_json::to_string(&job).unwrap();
        assert!(!json.contains("fssUploadIds"));
        assert!(!json.contains("cancelled"));
        assert!(!json.contains("localNasShortcut"));
        assert!(!json.contains("error"));
    }

    #[test]
    fn job_json_roundtrip() {
        let mut job = sample_job();
        job.fss_upload_ids
            .insert("/allen/aics/foo/test.czi".into(), "fss-9".into());
        job.cancelled = true;
        job.error = Some("Cancelled by user".into());

        let json = serde_json::to_string(&job).unwrap();
        let parsed: UploadJob = serde_json::from_str(&json).unwrap();
        assert_eq!(job, parsed);
    }

    #[test]
    fn patch_applies_only_set_fields() {
        let mut job = sample_job();
        let patch = JobPatch {
            status: Some(JobStatus::Working),
            fss_upload_ids: Some(HashMap::from([(
                "/allen/aics/foo/test.czi".to_string(),
                "fss-1".to_string(),
            )])),
            ..JobPatch::default()
        };
        patch.apply_to(&mut job);

        assert_eq!(job.status, JobStatus::Working);
        assert_eq!(
            job.fss_upload_id_for("/allen/aics/foo/test.czi"),
            Some("fss-1")
        );
        assert!(job.error.is_none());
        assert!(!job.cancelled);
    }

    #[test]
    fn failed_patch_carries_message() {
        let mut job = sample_job();
        JobPatch::failed("disk on fire").apply_to(&mut job);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("disk on fire"));
    }

    #[test]
    fn transfer_state_detection() {
        let mut job = sample_job();
        assert!(!job.has_transfer_state());
        job.fss_upload_ids.insert("a".into(), "b".into());
        assert!(job.has_transfer_state());
    }
}
