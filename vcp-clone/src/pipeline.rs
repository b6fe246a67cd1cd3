//! Pipeline facade: admission and the job query surface

use crate::cache::SynthesisCache;
use crate::collaborators::Collaborators;
use crate::config::PipelineSettings;
use crate::models::{CloneRequest, Job, JobId, JobStatus, JobSummary};
use crate::orchestrator::Orchestrator;
use crate::planner::Planner;
use crate::stages::StageContext;
use crate::store::JobStore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use vcp_common::config::RootFolderLayout;
use vcp_common::{Error, Result};

/// Interval between store reads in [`Pipeline::wait_for_terminal`]
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Response to a successful submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub id: JobId,
    pub status: JobStatus,
}

pub struct Pipeline {
    store: JobStore,
    orchestrator: Orchestrator,
    accepting: AtomicBool,
}

impl Pipeline {
    /// Build a pipeline over the directories of `layout`
    pub fn new(
        layout: &RootFolderLayout,
        settings: PipelineSettings,
        collaborators: Collaborators,
    ) -> Result<Self> {
        layout.ensure_directories_exist()?;
        let store = JobStore::open(layout.jobs_dir())?;
        let cache = SynthesisCache::open(layout.cache_dir())?;

        let ctx = Arc::new(StageContext {
            store: store.clone(),
            cache,
            collaborators,
            settings,
            work_dir: layout.work_dir(),
        });

        Ok(Self {
            store,
            orchestrator: Orchestrator::new(ctx),
            accepting: AtomicBool::new(true),
        })
    }

    /// Install a planner (consulted for payloads with `use_planner`)
    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.orchestrator = self.orchestrator.with_planner(planner);
        self
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Fail jobs left non-terminal by a previous process
    ///
    /// Call once at startup, before submitting, and only when no other
    /// process is running jobs against the same store.
    pub async fn recover_interrupted(&self) -> Result<Vec<JobId>> {
        let closed = self.store.fail_interrupted().await?;
        if !closed.is_empty() {
            info!(count = closed.len(), "Recovered interrupted jobs");
        }
        Ok(closed)
    }

    /// Resolve, validate, persist and start a clone job
    ///
    /// Returns as soon as the record exists; the job runs in the background.
    pub async fn submit(&self, request: CloneRequest) -> Result<SubmittedJob> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(Error::InvalidInput("pipeline is shutting down".to_string()));
        }

        let payload = request.resolve(&self.orchestrator.context().settings)?;
        let job = self.store.create(payload.clone()).await?;
        self.orchestrator.start(job.id, payload).await;

        Ok(SubmittedJob {
            id: job.id,
            status: job.status,
        })
    }

    pub async fn get(&self, id: JobId) -> Result<Option<Job>> {
        self.store.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<JobSummary>> {
        self.store.list().await
    }

    /// Request cancellation; false if the job is not running in this process
    pub async fn cancel(&self, id: JobId) -> bool {
        self.orchestrator.cancel(id).await
    }

    /// Poll the store until the job is terminal
    pub async fn wait_for_terminal(&self, id: JobId) -> Result<Job> {
        loop {
            let job = self
                .store
                .get(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;
            if job.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Stop accepting submissions and wait for running jobs
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.orchestrator.shutdown().await;
        info!("Pipeline shut down");
    }
}
