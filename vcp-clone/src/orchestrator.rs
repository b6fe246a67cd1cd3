//! Job orchestrator
//!
//! Runs policy → [planner] → [ingest] → synthesize → verify for one job on a
//! tracked background task. Every stage boundary catches panics and observes
//! cancellation, and every outcome ends in exactly one terminal store write.
//! The orchestrator never retries on its own; the only retry is the QC one
//! inside verify.

use crate::error::StageError;
use crate::error::CollaboratorError;
use crate::models::{Job, JobId, JobPayload, JobResult, JobStatus, JobUpdate, Stage, VoiceSettings};
use crate::planner::{apply_actions, PlanContext, Planner};
use crate::policy;
use crate::stages::{call_with_timeout, ingest, synthesize, verify, StageContext};
use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one stage, converting panics and cancellation into stage errors
async fn guarded<T, F>(stage: &str, token: &CancellationToken, fut: F) -> Result<T, StageError>
where
    F: Future<Output = Result<T, StageError>>,
{
    if token.is_cancelled() {
        return Err(StageError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(StageError::Cancelled),
        outcome = AssertUnwindSafe(fut).catch_unwind() => match outcome {
            Ok(result) => result,
            Err(panic) => Err(StageError::Orchestration(format!(
                "{} stage panicked: {}",
                stage,
                panic_message(panic.as_ref())
            ))),
        },
    }
}

/// Background job runner
#[derive(Clone)]
pub struct Orchestrator {
    ctx: Arc<StageContext>,
    planner: Option<Arc<dyn Planner>>,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    running: Arc<RwLock<HashMap<JobId, CancellationToken>>>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        let permits = Arc::new(Semaphore::new(ctx.settings.max_concurrent_jobs.max(1)));
        Self {
            ctx,
            planner: None,
            tracker: TaskTracker::new(),
            permits,
            running: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    /// Launch the job on a background task and return immediately
    ///
    /// The job stays `queued` until an execution permit is free.
    pub async fn start(&self, job_id: JobId, payload: JobPayload) {
        let token = CancellationToken::new();
        self.running.write().await.insert(job_id, token.clone());

        let this = self.clone();
        self.tracker.spawn(async move {
            info!(job_id = %job_id, "Background clone job task started");

            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                permit = this.permits.clone().acquire_owned() => permit.ok(),
            };

            let outcome = match permit {
                Some(_permit) => this.run(job_id, &payload, &token).await,
                None if token.is_cancelled() => this.finish(job_id, Err(StageError::Cancelled)).await,
                None => {
                    this.finish(
                        job_id,
                        Err(StageError::Orchestration("execution slots closed".to_string())),
                    )
                    .await
                }
            };

            match outcome {
                Ok(job) => info!(job_id = %job_id, status = %job.status, "Background clone job task finished"),
                Err(e) => error!(job_id = %job_id, error = %e, "Failed to record job outcome"),
            }

            this.running.write().await.remove(&job_id);
        });
    }

    /// Execute the full stage sequence and record the terminal outcome
    pub async fn run(
        &self,
        job_id: JobId,
        payload: &JobPayload,
        token: &CancellationToken,
    ) -> vcp_common::Result<Job> {
        let outcome = match AssertUnwindSafe(self.execute(job_id, payload, token))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => Err(StageError::Orchestration(panic_message(panic.as_ref()))),
        };
        self.finish(job_id, outcome).await
    }

    async fn execute(
        &self,
        job_id: JobId,
        payload: &JobPayload,
        token: &CancellationToken,
    ) -> Result<JobResult, StageError> {
        let ctx = &*self.ctx;

        guarded("policy", token, self.check_policy(job_id, payload)).await?;

        let mut settings = VoiceSettings::initial(payload, &ctx.settings.synthesis);
        if payload.use_planner {
            settings = guarded("planner", token, self.consult_planner(job_id, payload, settings)).await?;
        }

        let clean_reference = match &payload.raw_audio_path {
            Some(raw_audio) => Some(guarded("ingest", token, ingest::run(ctx, job_id, raw_audio)).await?),
            None => None,
        };

        let first = guarded(
            "synthesis",
            token,
            synthesize::run(ctx, job_id, payload, &settings, 1),
        )
        .await?;

        let (synthesis, qc) = guarded(
            "verify",
            token,
            verify::run(ctx, job_id, payload, first, clean_reference.as_deref()),
        )
        .await?;

        Ok(JobResult {
            voice_id: payload.voice_id.clone(),
            audio_path: synthesis.audio_path.clone(),
            synthesis,
            qc,
            clean_reference_path: clean_reference,
        })
    }

    async fn check_policy(&self, job_id: JobId, payload: &JobPayload) -> Result<(), StageError> {
        let store = &self.ctx.store;
        store.set_status(job_id, JobStatus::Validating).await?;

        match policy::evaluate(payload) {
            Ok(()) => {
                store
                    .append_event(job_id, "Policy check passed", Some(Stage::Policy), None)
                    .await?;
                Ok(())
            }
            Err(violation) => {
                store
                    .append_event(
                        job_id,
                        format!("Rejected: {}", violation),
                        Some(Stage::Policy),
                        Some(json!({ "reason": violation.to_string() })),
                    )
                    .await?;
                warn!(job_id = %job_id, reason = %violation, "Job rejected by policy guard");
                Err(violation.into())
            }
        }
    }

    /// Let the planner tune initial settings; any planner failure is non-fatal
    async fn consult_planner(
        &self,
        job_id: JobId,
        payload: &JobPayload,
        settings: VoiceSettings,
    ) -> Result<VoiceSettings, StageError> {
        let store = &self.ctx.store;
        let Some(planner) = &self.planner else {
            store
                .append_event(
                    job_id,
                    "Planner requested but none installed; using deterministic pipeline",
                    Some(Stage::Planner),
                    None,
                )
                .await?;
            return Ok(settings);
        };

        let context = PlanContext {
            job_id,
            voice_id: payload.voice_id.clone(),
            text: payload.text.clone(),
            mode: payload.mode,
            has_reference_audio: payload.raw_audio_path.is_some(),
            settings: settings.clone(),
        };

        let limit = self.ctx.settings.timeouts.planner;
        let planned = AssertUnwindSafe(call_with_timeout(planner.name(), limit, planner.plan(&context)))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(CollaboratorError::request(
                    planner.name(),
                    format!("panicked: {}", panic_message(panic.as_ref())),
                ))
            });

        match planned {
            Ok(actions) => {
                let (adjusted, notes) = apply_actions(&settings, &actions);
                store
                    .append_event(
                        job_id,
                        format!("Planner {} produced {} action(s)", planner.name(), actions.len()),
                        Some(Stage::Planner),
                        Some(json!({ "settings": adjusted, "notes": notes })),
                    )
                    .await?;
                Ok(adjusted)
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Planner failed; continuing without it");
                store
                    .append_event(
                        job_id,
                        format!("Planner failed; continuing with deterministic pipeline: {}", e),
                        Some(Stage::Planner),
                        None,
                    )
                    .await?;
                Ok(settings)
            }
        }
    }

    /// Record the terminal outcome
    ///
    /// If the normal bookkeeping fails, a bare `failed` write is attempted so
    /// the job does not stay non-terminal.
    async fn finish(
        &self,
        job_id: JobId,
        outcome: Result<JobResult, StageError>,
    ) -> vcp_common::Result<Job> {
        let store = &self.ctx.store;

        let recorded = match outcome {
            Ok(result) => {
                let recorded = async {
                    store
                        .append_event(
                            job_id,
                            "Job completed",
                            Some(Stage::Orchestrator),
                            Some(json!({ "audio_path": result.audio_path })),
                        )
                        .await?;
                    store.set_result(job_id, result).await
                }
                .await;
                if let Ok(job) = &recorded {
                    info!(job_id = %job_id, audio_path = ?job.result.as_ref().map(|r| &r.audio_path), "Job completed");
                }
                recorded
            }
            Err(err) => {
                let message = err.job_message();
                error!(job_id = %job_id, error = %message, "Job failed");

                let mut update = JobUpdate::failed(message.clone());
                if let Some(report) = err.qc_report() {
                    update = update.with_qc(report.clone());
                }
                async {
                    store
                        .append_event(
                            job_id,
                            format!("Job failed: {}", message),
                            Some(Stage::Orchestrator),
                            Some(json!({ "error": message })),
                        )
                        .await?;
                    store.update(job_id, update).await
                }
                .await
            }
        };

        match recorded {
            Ok(job) => Ok(job),
            Err(e) => {
                error!(
                    job_id = %job_id,
                    error = %e,
                    "Failed to record job outcome - attempting direct failure write"
                );
                store
                    .set_error(job_id, format!("orchestration error: {}", e))
                    .await
            }
        }
    }

    /// Request cooperative cancellation; false if the job is not running here
    pub async fn cancel(&self, job_id: JobId) -> bool {
        match self.running.read().await.get(&job_id) {
            Some(token) => {
                token.cancel();
                info!(job_id = %job_id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Stop accepting tasks and wait for every running job to finish
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
