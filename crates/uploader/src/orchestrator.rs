//! Upload orchestration state machine.
//!
//! The orchestrator is the only writer of job status. It drives the whole
//! lifecycle: initiate → upload → retry → cancel → complete, delegating
//! byte transfer to the chunked reader and all remote state to the FSS and
//! JSS ports.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use biofile_protocol::{
    FinalizeResult, FssStatus, FssUploadRecord, JobPatch, JobSpec, JobStatus, RegisterUploadMeta,
    UploadFileSpec, UploadJob,
};
use biofile_transfer::{Chunk, ChunkReader, DEFAULT_CHUNK_SIZE};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clients::{JobClient, MetadataClient, StorageClient};
use crate::config::UploaderConfig;
use crate::error::UploadError;
use crate::events::UploadEvent;

/// Error message recorded on a job cancelled by the user, distinct from a
/// generic failure.
const CANCELLED_BY_USER: &str = "Cancelled by user";

/// What `retry` should do for one file, decided from a snapshot of the FSS
/// record. Deriving this in one place keeps call sites from re-deriving the
/// answer out of two separately evolving status enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResumeAction {
    /// Server discarded partial state (or errored out); re-register and
    /// restart the transfer under a new upload id.
    Restart,
    /// Transfer is mid-stream; send only the chunks the server lacks.
    ResumeStream,
    /// Every chunk is in but finalize failed; re-run finalize only, without
    /// touching the source file.
    RetryFinalize,
    /// Bytes already committed; only attributes and metadata remain.
    AlreadyComplete,
}

impl ResumeAction {
    fn from_record(record: &FssUploadRecord) -> Self {
        match record.status {
            FssStatus::Working => ResumeAction::ResumeStream,
            FssStatus::Retry => ResumeAction::RetryFinalize,
            FssStatus::Complete => ResumeAction::AlreadyComplete,
            FssStatus::Inactive | FssStatus::Error => ResumeAction::Restart,
        }
    }
}

fn ensure_finalized(result: &FinalizeResult) -> Result<(), UploadError> {
    if result.error_count > 0 {
        return Err(UploadError::Finalize {
            upload_id: result.upload_id.clone(),
            error_count: result.error_count,
        });
    }
    Ok(())
}

/// Bytes covered by 1-based chunk `number` of a file.
fn chunk_bytes(number: i32, chunk_size: i64, file_size: i64) -> i64 {
    let start = (i64::from(number) - 1) * chunk_size;
    (file_size - start).clamp(0, chunk_size)
}

/// Drives uploads into the file management system.
pub struct UploadOrchestrator {
    fss: Arc<dyn StorageClient>,
    jss: Arc<dyn JobClient>,
    mms: Arc<dyn MetadataClient>,
    config: UploaderConfig,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    /// Transfers running in this process, job id → cancellation token.
    active: Mutex<HashMap<String, CancellationToken>>,
}

impl UploadOrchestrator {
    pub fn new(
        fss: Arc<dyn StorageClient>,
        jss: Arc<dyn JobClient>,
        mms: Arc<dyn MetadataClient>,
        config: UploaderConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            fss,
            jss,
            mms,
            config,
            events_tx,
            events_rx: Some(events_rx),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Creates a job wrapping `files` and returns it. No bytes move yet.
    pub async fn initiate_upload(
        &self,
        files: Vec<UploadFileSpec>,
        job_name: &str,
    ) -> Result<UploadJob, UploadError> {
        let spec = JobSpec {
            name: job_name.to_string(),
            files,
        };
        let job = self.jss.create_job(&spec).await?;
        info!(job = %job.id, files = job.files.len(), "upload job created");
        Ok(job)
    }

    /// Runs the full upload for `job`: every file independently registered,
    /// transferred, finalized, and committed. The job reaches SUCCEEDED
    /// only once all of them did.
    pub async fn upload(&self, job: &UploadJob) -> Result<UploadJob, UploadError> {
        let token = self.register_active(&job.id)?;
        let result = self.run_upload(job, &token).await;
        self.clear_active(&job.id);
        match result {
            Ok(updated) => {
                self.emit(UploadEvent::Completed {
                    job_id: job.id.clone(),
                });
                Ok(updated)
            }
            Err(e) => {
                self.fail_job(&job.id, &e).await;
                Err(e)
            }
        }
    }

    /// Resumes a previously failed or interrupted job.
    ///
    /// The FSS record for each file decides how much work is left; chunks
    /// the server already holds are never re-sent, and a transfer whose
    /// chunks are all in is only re-finalized, never re-read.
    pub async fn retry(&self, job_id: &str) -> Result<UploadJob, UploadError> {
        if self.active.lock().unwrap().contains_key(job_id) {
            return Err(UploadError::InvalidJobState(format!(
                "a transfer is already running for job {job_id}"
            )));
        }

        let job = self.jss.get_job(job_id).await?;
        if job.status == JobStatus::Succeeded {
            return Err(UploadError::InvalidJobState(format!(
                "job {job_id} already succeeded"
            )));
        }

        // Nothing was ever registered: treat as a brand-new upload.
        if !job.has_transfer_state() {
            info!(job = %job.id, "no transfer state recorded; starting fresh");
            let fresh = self.initiate_upload(job.files.clone(), &job.name).await?;
            return self.upload(&fresh).await;
        }

        let token = self.register_active(job_id)?;
        let result = self.run_retry(&job, &token).await;
        self.clear_active(job_id);
        match result {
            Ok(updated) => {
                self.emit(UploadEvent::Completed {
                    job_id: job_id.to_string(),
                });
                Ok(updated)
            }
            Err(e) => {
                self.fail_job(job_id, &e).await;
                Err(e)
            }
        }
    }

    /// Cancels an in-flight upload.
    ///
    /// Rejected if the job has nothing in flight, or if the FSS record is
    /// already COMPLETE (bytes committed cannot be un-committed); in both
    /// cases the job is left unmodified.
    pub async fn cancel(&self, job_id: &str) -> Result<(), UploadError> {
        let job = self.jss.get_job(job_id).await?;
        if job.status != JobStatus::Working {
            return Err(UploadError::InvalidJobState(format!(
                "job {job_id} has nothing in flight (status {:?})",
                job.status
            )));
        }
        for upload_id in job.fss_upload_ids.values() {
            let record = self.fss.get_status(upload_id).await?;
            if record.status == FssStatus::Complete {
                return Err(UploadError::InvalidJobState(format!(
                    "upload {upload_id} already committed; too late to cancel"
                )));
            }
        }

        // Stop the reader; in-flight sends are not force-aborted but their
        // outcomes are discarded from here on.
        let token = self.active.lock().unwrap().get(job_id).cloned();
        if let Some(token) = token {
            token.cancel();
        }

        for upload_id in job.fss_upload_ids.values() {
            self.fss.cancel_upload(upload_id).await?;
        }

        let patch = JobPatch {
            status: Some(JobStatus::Failed),
            cancelled: Some(true),
            error: Some(CANCELLED_BY_USER.to_string()),
            ..JobPatch::default()
        };
        self.jss.update_job(job_id, &patch).await?;
        info!(job = job_id, "upload cancelled by user");
        self.emit(UploadEvent::Failed {
            job_id: job_id.to_string(),
            error: CANCELLED_BY_USER.to_string(),
        });
        Ok(())
    }

    /// Records metadata for a committed file.
    ///
    /// On failure the job is marked FAILED with an explanatory message and
    /// the error propagates to the caller.
    pub async fn complete(&self, job: &UploadJob, file_id: &str) -> Result<(), UploadError> {
        match self.mms.create_file_metadata(&job.id, file_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = match e {
                    UploadError::Metadata(_) => e,
                    other => UploadError::Metadata(other.to_string()),
                };
                error!(job = %job.id, file_id, error = %err, "metadata creation failed");
                if let Err(patch_err) = self
                    .jss
                    .update_job(&job.id, &JobPatch::failed(err.to_string()))
                    .await
                {
                    warn!(job = %job.id, error = %patch_err, "failed to record job failure");
                }
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn run_upload(
        &self,
        job: &UploadJob,
        token: &CancellationToken,
    ) -> Result<UploadJob, UploadError> {
        self.jss
            .update_job(&job.id, &JobPatch::status(JobStatus::Working))
            .await?;
        for file in &job.files {
            self.upload_file(job, file, token).await?;
        }
        self.jss
            .update_job(&job.id, &JobPatch::status(JobStatus::Succeeded))
            .await?;
        self.jss.get_job(&job.id).await
    }

    async fn run_retry(
        &self,
        job: &UploadJob,
        token: &CancellationToken,
    ) -> Result<UploadJob, UploadError> {
        self.jss
            .update_job(&job.id, &JobPatch::status(JobStatus::Retrying))
            .await?;

        for file in &job.files {
            let Some(upload_id) = job.fss_upload_id_for(&file.original_path).map(str::to_owned)
            else {
                // This file never got registered before the previous attempt
                // died; run it from scratch.
                self.upload_file(job, file, token).await?;
                continue;
            };

            let record = self.fss.get_status(&upload_id).await?;
            let action = ResumeAction::from_record(&record);
            info!(
                job = %job.id,
                upload = %upload_id,
                status = ?record.status,
                action = ?action,
                "resuming upload"
            );

            match action {
                ResumeAction::Restart => self.upload_file(job, file, token).await?,
                ResumeAction::ResumeStream => {
                    let skip = record.complete_chunks();
                    let md5 = self.stream_chunks(job, file, &record, &skip, token).await?;
                    self.finalize_and_complete(job, file, &upload_id, Some(&md5))
                        .await?;
                }
                ResumeAction::RetryFinalize => {
                    let result = if job.local_nas_shortcut {
                        self.fss.retry_finalize_nas_shortcut(&upload_id).await?
                    } else {
                        let last_chunk = record.chunk_statuses.len() as i32;
                        let chunk_info = self.fss.get_chunk_info(&upload_id, last_chunk).await?;
                        self.fss
                            .retry_finalize_md5(&upload_id, &chunk_info.cumulative_md5)
                            .await?
                    };
                    ensure_finalized(&result)?;
                    self.commit_file(job, file, &upload_id).await?;
                }
                ResumeAction::AlreadyComplete => self.commit_file(job, file, &upload_id).await?,
            }
        }

        self.jss
            .update_job(&job.id, &JobPatch::status(JobStatus::Succeeded))
            .await?;
        self.jss.get_job(&job.id).await
    }

    /// Registers, transfers, finalizes, and commits a single file.
    async fn upload_file(
        &self,
        job: &UploadJob,
        file: &UploadFileSpec,
        token: &CancellationToken,
    ) -> Result<(), UploadError> {
        let path = Path::new(&file.original_path);
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
            .ok_or_else(|| UploadError::InvalidPath(file.original_path.clone()))?;

        let metadata = tokio::fs::metadata(path).await?;
        let size = metadata.len() as i64;
        let last_modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64);
        let nas = self
            .config
            .nas
            .should_be_local_nas_upload(&file.original_path);

        if self.fss.file_exists_by_name_and_size(&name, size).await? {
            return Err(UploadError::DuplicateFile(name));
        }

        let meta = RegisterUploadMeta {
            original_path: file.original_path.clone(),
            last_modified_ms,
            local_nas_shortcut: nas,
        };
        let record = self.fss.register_upload(&name, size, &meta).await?;
        info!(
            job = %job.id,
            upload = %record.upload_id,
            size,
            nas,
            "upload registered"
        );

        let patch = JobPatch {
            fss_upload_ids: Some(HashMap::from([(
                file.original_path.clone(),
                record.upload_id.clone(),
            )])),
            last_modified_ms,
            local_nas_shortcut: Some(nas),
            ..JobPatch::default()
        };
        self.jss.update_job(&job.id, &patch).await?;

        let md5 = if nas {
            self.await_nas_ingest(job, file, &record.upload_id, token)
                .await?;
            None
        } else {
            Some(self.stream_chunks(job, file, &record, &[], token).await?)
        };

        self.finalize_and_complete(job, file, &record.upload_id, md5.as_deref())
            .await
    }

    /// Streams the file in chunks with bounded-concurrency dispatch.
    ///
    /// The reader hashes every byte in offset order; chunks listed in
    /// `skip` are hashed but not re-sent. Returns the whole-file MD5.
    async fn stream_chunks(
        &self,
        job: &UploadJob,
        file: &UploadFileSpec,
        record: &FssUploadRecord,
        skip: &[i32],
        token: &CancellationToken,
    ) -> Result<String, UploadError> {
        let chunk_size = if record.chunk_size > 0 {
            record.chunk_size as usize
        } else {
            DEFAULT_CHUNK_SIZE
        };
        let mut reader = ChunkReader::open(Path::new(&file.original_path), chunk_size).await?;
        let total = reader.file_size();
        let skip: HashSet<i32> = skip.iter().copied().collect();

        // Progress starts past the bytes the server already holds.
        let mut transferred: i64 = skip
            .iter()
            .map(|n| chunk_bytes(*n, chunk_size as i64, total))
            .sum();

        debug!(
            job = %job.id,
            upload = %record.upload_id,
            chunks = reader.chunk_count(),
            skipped = skip.len(),
            "streaming chunks"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.chunk_workers.max(1)));
        let mut sends: JoinSet<Result<usize, UploadError>> = JoinSet::new();

        loop {
            if token.is_cancelled() {
                return Err(UploadError::Cancelled);
            }
            let Some(chunk) = reader.next_chunk().await? else {
                break;
            };
            if skip.contains(&chunk.number) {
                continue;
            }

            // The permit bounds both in-flight sends and buffered bytes.
            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(UploadError::Cancelled),
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    permit.map_err(|e| UploadError::ChunkTask(e.to_string()))?
                }
            };

            let fss = Arc::clone(&self.fss);
            let upload_id = record.upload_id.clone();
            let Chunk {
                number,
                size,
                data,
                cumulative_md5,
                ..
            } = chunk;
            sends.spawn(async move {
                let _permit = permit;
                fss.send_upload_chunk(&upload_id, number, data, &cumulative_md5)
                    .await?;
                Ok(size)
            });

            // Surface send failures early instead of reading to EOF first.
            while let Some(joined) = sends.try_join_next() {
                let sent = joined.map_err(|e| UploadError::ChunkTask(e.to_string()))??;
                transferred += sent as i64;
                self.emit(UploadEvent::Progress {
                    job_id: job.id.clone(),
                    original_path: file.original_path.clone(),
                    transferred_bytes: transferred,
                    total_bytes: total,
                });
            }
        }

        // Drain outstanding sends; outcomes are discarded once cancelled.
        loop {
            let joined = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(UploadError::Cancelled),
                joined = sends.join_next() => joined,
            };
            let Some(joined) = joined else {
                break;
            };
            let sent = joined.map_err(|e| UploadError::ChunkTask(e.to_string()))??;
            transferred += sent as i64;
            self.emit(UploadEvent::Progress {
                job_id: job.id.clone(),
                original_path: file.original_path.clone(),
                transferred_bytes: transferred,
                total_bytes: total,
            });
        }

        match reader.final_md5() {
            Some(md5) => Ok(md5.to_string()),
            None => Err(UploadError::ChunkTask(
                "reader stopped before end of file".into(),
            )),
        }
    }

    /// Waits for the backend to ingest a NAS shortcut upload on its own.
    async fn await_nas_ingest(
        &self,
        job: &UploadJob,
        file: &UploadFileSpec,
        upload_id: &str,
        token: &CancellationToken,
    ) -> Result<(), UploadError> {
        let interval = self.config.nas_poll_interval();
        loop {
            let record = self.fss.get_status(upload_id).await?;
            match record.status {
                FssStatus::Complete => {
                    self.emit(UploadEvent::Progress {
                        job_id: job.id.clone(),
                        original_path: file.original_path.clone(),
                        transferred_bytes: record.file_size,
                        total_bytes: record.file_size,
                    });
                    return Ok(());
                }
                FssStatus::Error => {
                    return Err(UploadError::Storage(format!(
                        "server failed ingesting upload {upload_id}"
                    )));
                }
                FssStatus::Inactive => {
                    return Err(UploadError::Storage(format!(
                        "server discarded upload {upload_id} before ingest finished"
                    )));
                }
                FssStatus::Working | FssStatus::Retry => {
                    self.emit(UploadEvent::Progress {
                        job_id: job.id.clone(),
                        original_path: file.original_path.clone(),
                        transferred_bytes: record.current_file_size,
                        total_bytes: record.file_size,
                    });
                }
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn finalize_and_complete(
        &self,
        job: &UploadJob,
        file: &UploadFileSpec,
        upload_id: &str,
        md5: Option<&str>,
    ) -> Result<(), UploadError> {
        let result = self.fss.finalize(upload_id, md5).await?;
        ensure_finalized(&result)?;
        info!(job = %job.id, upload = %upload_id, "upload finalized");
        self.commit_file(job, file, upload_id).await
    }

    /// Fetches committed-file attributes and records metadata.
    async fn commit_file(
        &self,
        job: &UploadJob,
        file: &UploadFileSpec,
        upload_id: &str,
    ) -> Result<(), UploadError> {
        let attrs = self.fss.get_file_attributes(upload_id).await?;
        self.complete(job, &attrs.file_id).await?;
        info!(job = %job.id, file_id = %attrs.file_id, "file committed");
        self.emit(UploadEvent::FileCommitted {
            job_id: job.id.clone(),
            original_path: file.original_path.clone(),
            file_id: attrs.file_id,
        });
        Ok(())
    }

    async fn fail_job(&self, job_id: &str, err: &UploadError) {
        let message = if err.is_cancellation() {
            CANCELLED_BY_USER.to_string()
        } else {
            err.to_string()
        };
        let patch = JobPatch {
            status: Some(JobStatus::Failed),
            cancelled: err.is_cancellation().then_some(true),
            error: Some(message.clone()),
            ..JobPatch::default()
        };
        if let Err(e) = self.jss.update_job(job_id, &patch).await {
            warn!(job = job_id, error = %e, "failed to record job failure");
        }
        self.emit(UploadEvent::Failed {
            job_id: job_id.to_string(),
            error: message,
        });
    }

    fn register_active(&self, job_id: &str) -> Result<CancellationToken, UploadError> {
        let mut active = self.active.lock().unwrap();
        if active.contains_key(job_id) {
            return Err(UploadError::InvalidJobState(format!(
                "a transfer is already running for job {job_id}"
            )));
        }
        let token = CancellationToken::new();
        active.insert(job_id.to_string(), token.clone());
        Ok(token)
    }

    fn clear_active(&self, job_id: &str) {
        self.active.lock().unwrap().remove(job_id);
    }

    fn emit(&self, event: UploadEvent) {
        // Progress is lossy by design; a slow consumer never blocks the
        // transfer.
        let _ = self.events_tx.try_send(event);
    }
}
