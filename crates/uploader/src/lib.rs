//! Upload engine for the biofile file browser.
//!
//! Moves local files into the remote file management system with
//! byte-exact MD5 verification, resumable transfers, bounded-concurrency
//! chunk dispatch, and a local NAS shortcut for files the backend can
//! reach over a shared mount.
//!
//! The [`UploadOrchestrator`] is the single entry point; it consumes the
//! storage, job-tracking, and metadata services through the
//! [`StorageClient`], [`JobClient`], and [`MetadataClient`] traits so
//! callers can wire in real transports and tests can run against
//! in-memory fakes.

mod clients;
mod config;
mod error;
mod events;
mod orchestrator;

pub use clients::{ClientFuture, JobClient, MetadataClient, StorageClient};
pub use config::UploaderConfig;
pub use error::UploadError;
pub use events::UploadEvent;
pub use orchestrator::UploadOrchestrator;
