//! Verify: QC scoring with at most one automatic re-synthesis

use super::{synthesize, StageContext};
use crate::error::StageError;
use crate::models::{JobId, JobPayload, JobStatus, QcDecision, QcReport, Stage, SynthesisResult};
use crate::qc::{adjust_for_retry, evaluate_gates, score_take, MAX_AUTOMATIC_RETRIES};
use serde_json::json;
use std::path::Path;
use tracing::{info, warn};

/// Score `synthesis`; on failure retry once with adjusted settings
///
/// Returns the accepted take and its report, or a quality failure carrying
/// the report of the last pass.
pub async fn run(
    ctx: &StageContext,
    job_id: JobId,
    payload: &JobPayload,
    synthesis: SynthesisResult,
    reference: Option<&Path>,
) -> Result<(SynthesisResult, QcReport), StageError> {
    let mut synthesis = synthesis;
    let mut retries_used: u8 = 0;
    let mut notes: Vec<String> = Vec::new();

    loop {
        ctx.store.set_status(job_id, JobStatus::Verifying).await?;

        let scored = score_take(
            &ctx.collaborators,
            &ctx.settings,
            &payload.text,
            &synthesis.audio_path,
            reference,
        )
        .await;
        for note in scored.notes {
            if !notes.contains(&note) {
                notes.push(note);
            }
        }

        let verdict = evaluate_gates(&scored.metrics, &payload.gates);
        let passed = verdict.passed() && scored.scorer_failure.is_none();

        ctx.store
            .append_event(
                job_id,
                format!("QC pass {} evaluated", retries_used + 1),
                Some(Stage::Qc),
                Some(json!({
                    "wer": scored.metrics.wer,
                    "speaker_cosine": scored.metrics.speaker_cosine,
                    "transcript": scored.metrics.transcript,
                    "passed": passed,
                    "reasons": verdict.reasons,
                })),
            )
            .await?;

        let report = QcReport {
            decision: if passed { QcDecision::Pass } else { QcDecision::Fail },
            metrics: scored.metrics,
            retries_used,
            notes: notes.clone(),
            final_audio_path: synthesis.audio_path.clone(),
        };

        if let Some(failure) = scored.scorer_failure {
            // Re-synthesis cannot repair an unavailable scorer
            return Err(StageError::Quality {
                reason: format!("speaker similarity unavailable: {}", failure),
                report: Box::new(report),
            });
        }

        if passed {
            info!(job_id = %job_id, retries_used, "QC passed");
            return Ok((synthesis, report));
        }

        if retries_used >= MAX_AUTOMATIC_RETRIES {
            warn!(job_id = %job_id, reasons = ?verdict.reasons, "QC failed after retry");
            return Err(StageError::Quality {
                reason: format!("qc failed after retry: {}", verdict.reasons.join("; ")),
                report: Box::new(report),
            });
        }

        let adjusted = adjust_for_retry(&synthesis.settings, &verdict, &payload.retry);
        ctx.store
            .append_event(
                job_id,
                "QC failed; retrying synthesis",
                Some(Stage::Qc),
                Some(json!({
                    "reasons": verdict.reasons,
                    "previous_settings": synthesis.settings,
                    "adjusted_settings": adjusted,
                })),
            )
            .await?;
        info!(job_id = %job_id, reasons = ?verdict.reasons, "QC failed; retrying once");

        retries_used += 1;
        synthesis = synthesize::run(ctx, job_id, payload, &adjusted, retries_used + 1).await?;
    }
}
