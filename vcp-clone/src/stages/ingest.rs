//! Ingest: clean the raw reference recording
//!
//! Runs only when the payload carries `raw_audio_path`. Any failure is fatal
//! for the job; there is no retry.

use super::{call_with_timeout, StageContext};
use crate::collaborators::CleanupOutcome;
use crate::error::{CollaboratorError, StageError};
use crate::models::{JobId, JobStatus, JobUpdate, Stage};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn preprocessing_failed(reason: impl std::fmt::Display) -> StageError {
    StageError::Input(format!("audio preprocessing failed: {}", reason))
}

/// Clean `raw_audio` and record the cleaned reference path on the job
pub async fn run(ctx: &StageContext, job_id: JobId, raw_audio: &Path) -> Result<PathBuf, StageError> {
    ctx.store.set_status(job_id, JobStatus::Ingesting).await?;
    ctx.store
        .append_event(
            job_id,
            "Preprocessing reference audio",
            Some(Stage::Ingestion),
            Some(json!({ "raw_audio_path": raw_audio })),
        )
        .await?;

    if !tokio::fs::try_exists(raw_audio).await.unwrap_or(false) {
        return Err(preprocessing_failed(format!(
            "reference audio not found: {}",
            raw_audio.display()
        )));
    }

    let output_dir = ctx.work_dir.join(job_id.to_string());
    tokio::fs::create_dir_all(&output_dir)
        .await
        .map_err(vcp_common::Error::from)?;

    let cleaner = &ctx.collaborators.cleaner;
    let limit = ctx.settings.timeouts.preprocess;
    let outcome = call_with_timeout(cleaner.name(), limit, cleaner.clean(raw_audio, &output_dir)).await;

    let clean_path = match outcome {
        Ok(CleanupOutcome::Clean(path)) => path,
        Ok(CleanupOutcome::Unusable(reason)) => {
            warn!(job_id = %job_id, reason = %reason, "Reference audio rejected by cleanup");
            return Err(preprocessing_failed(reason));
        }
        Err(CollaboratorError::TimedOut { seconds, .. }) => {
            return Err(StageError::Timeout {
                stage: "preprocess",
                seconds,
            });
        }
        Err(e) => return Err(preprocessing_failed(e)),
    };

    if !tokio::fs::try_exists(&clean_path).await.unwrap_or(false) {
        return Err(preprocessing_failed(format!(
            "cleaned audio missing: {}",
            clean_path.display()
        )));
    }

    ctx.store
        .update(
            job_id,
            JobUpdate {
                clean_reference_path: Some(clean_path.clone()),
                ..Default::default()
            },
        )
        .await?;
    ctx.store
        .append_event(
            job_id,
            "Reference audio cleaned",
            Some(Stage::Ingestion),
            Some(json!({ "clean_path": clean_path })),
        )
        .await?;

    info!(job_id = %job_id, clean_path = %clean_path.display(), "Ingest complete");
    Ok(clean_path)
}
