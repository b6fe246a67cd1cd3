//! Durable job store
//!
//! One pretty-printed JSON record per job (`<id>.json`) under the jobs
//! directory, fronted by an in-memory index. A single lock serializes the
//! index and every write, and each mutation is on disk before the call
//! returns.
//!
//! Mutations run on their own task. A caller that is dropped mid-write (a
//! cancelled stage) never leaves the index behind the file on disk.

use crate::models::{Job, JobEvent, JobId, JobPayload, JobResult, JobStatus, JobSummary, JobUpdate, Stage};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vcp_common::fs::{is_temp_file, write_atomic};
use vcp_common::{Error, Result};

/// Error recorded on jobs left non-terminal by a previous process
pub const INTERRUPTED_ERROR: &str = "interrupted by process restart";

struct StoreInner {
    dir: PathBuf,
    index: Mutex<HashMap<JobId, Job>>,
}

/// Durable, shareable job store (cheap to clone)
#[derive(Clone)]
pub struct JobStore {
    inner: Arc<StoreInner>,
}

impl JobStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                dir,
                index: Mutex::new(HashMap::new()),
            }),
        })
    }

    fn record_path(&self, id: JobId) -> PathBuf {
        self.inner.dir.join(format!("{}.json", id))
    }

    /// Run a mutation to completion even if the caller stops waiting
    async fn detached<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(JobStore) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        tokio::spawn(op(self.clone()))
            .await
            .map_err(|e| Error::Internal(format!("job store write task failed: {}", e)))?
    }

    async fn persist(&self, job: &Job) -> Result<()> {
        let json = serde_json::to_vec_pretty(job)?;
        write_atomic(&self.record_path(job.id), &json).await
    }

    /// Read one record; a malformed file reads as absent
    async fn load(&self, id: JobId) -> Result<Option<Job>> {
        let path = self.record_path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring malformed job record");
                Ok(None)
            }
        }
    }

    /// Index lookup with disk fallback; caller holds the lock
    async fn fetch(&self, index: &mut HashMap<JobId, Job>, id: JobId) -> Result<Option<Job>> {
        if let Some(job) = index.get(&id) {
            return Ok(Some(job.clone()));
        }
        let loaded = self.load(id).await?;
        if let Some(job) = &loaded {
            debug!(job_id = %id, "Loaded job record from disk");
            index.insert(id, job.clone());
        }
        Ok(loaded)
    }

    /// Create and persist a new queued job
    pub async fn create(&self, payload: JobPayload) -> Result<Job> {
        self.detached(move |store| async move {
            let job = Job::new(payload);
            let mut index = store.inner.index.lock().await;
            store.persist(&job).await?;
            index.insert(job.id, job.clone());
            info!(job_id = %job.id, voice_id = %job.payload.voice_id, "Job created");
            Ok(job)
        })
        .await
    }

    /// Get a job by id (falls back to disk on index miss)
    pub async fn get(&self, id: JobId) -> Result<Option<Job>> {
        let mut index = self.inner.index.lock().await;
        self.fetch(&mut index, id).await
    }

    /// Merge `update` into the job and persist
    ///
    /// Rejected updates (invalid transition, terminal job) write nothing.
    pub async fn update(&self, id: JobId, update: JobUpdate) -> Result<Job> {
        self.detached(move |store| async move {
            let mut index = store.inner.index.lock().await;
            let mut job = store
                .fetch(&mut index, id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;

            job.apply(update)?;
            store.persist(&job).await?;
            index.insert(id, job.clone());
            Ok(job)
        })
        .await
    }

    /// Append an event to the job log
    ///
    /// No-op for unknown jobs; ignored (with a warning) for terminal jobs.
    pub async fn append_event(
        &self,
        id: JobId,
        message: impl Into<String>,
        stage: Option<Stage>,
        data: Option<serde_json::Value>,
    ) -> Result<()> {
        let event = JobEvent::new(message, stage, data);
        self.detached(move |store| async move {
            let mut index = store.inner.index.lock().await;
            let Some(mut job) = store.fetch(&mut index, id).await? else {
                debug!(job_id = %id, "append_event on unknown job ignored");
                return Ok(());
            };

            if job.is_terminal() {
                warn!(
                    job_id = %id,
                    status = %job.status,
                    message = %event.message,
                    "Ignoring event for terminal job"
                );
                return Ok(());
            }

            job.events.push(event);
            job.updated_at = chrono::Utc::now();
            store.persist(&job).await?;
            index.insert(id, job);
            Ok(())
        })
        .await
    }

    pub async fn set_status(&self, id: JobId, status: JobStatus) -> Result<Job> {
        self.update(id, JobUpdate::status(status)).await
    }

    /// Mark the job failed with `error`
    pub async fn set_error(&self, id: JobId, error: impl Into<String>) -> Result<Job> {
        self.update(id, JobUpdate::failed(error)).await
    }

    /// Mark the job completed with `result`
    pub async fn set_result(&self, id: JobId, result: JobResult) -> Result<Job> {
        self.update(id, JobUpdate::completed(result)).await
    }

    /// Read every persisted record (stray temp files and unreadable records skipped)
    async fn load_all(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.inner.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_temp_file(&path) || path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable job record");
                    continue;
                }
            };
            match serde_json::from_slice::<Job>(&bytes) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping malformed job record");
                }
            }
        }

        Ok(jobs)
    }

    /// Summaries of every persisted job, newest first
    pub async fn list(&self) -> Result<Vec<JobSummary>> {
        let _index = self.inner.index.lock().await;
        let mut jobs = self.load_all().await?;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs.iter().map(Job::summary).collect())
    }

    /// Fail every persisted non-terminal job; returns the affected ids
    ///
    /// Run at startup, before any job is started by this process.
    pub async fn fail_interrupted(&self) -> Result<Vec<JobId>> {
        self.detached(|store| async move {
            let mut index = store.inner.index.lock().await;
            let jobs = store.load_all().await?;
            let mut closed = Vec::new();

            for mut job in jobs.into_iter().filter(|job| !job.is_terminal()) {
                let id = job.id;
                job.apply(JobUpdate::failed(INTERRUPTED_ERROR))?;
                store.persist(&job).await?;
                index.insert(id, job);
                warn!(job_id = %id, "Marked interrupted job as failed");
                closed.push(id);
            }

            Ok(closed)
        })
        .await
    }
}
