//! Synthesize: cache lookup, chunked TTS calls, cache store

use super::{call_with_timeout, StageContext};
use crate::collaborators::TtsRequest;
use crate::error::{CollaboratorError, StageError};
use crate::models::{JobId, JobPayload, JobStatus, JobUpdate, Stage, SynthesisResult, VoiceSettings};
use crate::text::split_into_chunks;
use serde_json::json;
use tracing::{debug, info};

fn tts_failed(reason: impl std::fmt::Display) -> StageError {
    StageError::Provider(format!("tts generation failed: {}", reason))
}

/// Produce audio for `payload.text` with `settings`
///
/// `attempt` is 1 for the first synthesis and 2 for the QC retry. A cache
/// hit makes no provider call. Concurrent jobs with the same key wait for
/// each other, so only one of them pays for synthesis.
pub async fn run(
    ctx: &StageContext,
    job_id: JobId,
    payload: &JobPayload,
    settings: &VoiceSettings,
    attempt: u8,
) -> Result<SynthesisResult, StageError> {
    ctx.store.set_status(job_id, JobStatus::Synthesizing).await?;

    let key = ctx.cache.key(&payload.voice_id, &payload.text, settings);
    let claim = ctx.cache.claim(&key).await;

    let result = if let Some(audio_path) = ctx.cache.lookup(&key).await {
        ctx.store
            .append_event(
                job_id,
                "Synthesis cache hit",
                Some(Stage::Synthesis),
                Some(json!({ "attempt": attempt, "cache_key": key.digest, "audio_path": audio_path })),
            )
            .await?;
        SynthesisResult {
            audio_path,
            settings: settings.clone(),
            was_cached: true,
            cache_key: key.digest.clone(),
            chunks: 0,
        }
    } else {
        let chunks = split_into_chunks(&payload.text, ctx.settings.synthesis.max_chunk_chars);
        if chunks.is_empty() {
            return Err(tts_failed("no text to synthesize"));
        }
        ctx.store
            .append_event(
                job_id,
                format!("Synthesizing {} chunk(s)", chunks.len()),
                Some(Stage::Synthesis),
                Some(json!({ "attempt": attempt, "settings": settings, "chunks": chunks.len() })),
            )
            .await?;

        let tts = &ctx.collaborators.tts;
        let limit = ctx.settings.timeouts.synthesis;
        let mut audio = Vec::new();

        for (index, chunk) in chunks.iter().enumerate() {
            let request = TtsRequest {
                voice_id: payload.voice_id.clone(),
                text: chunk.clone(),
                settings: settings.clone(),
            };
            let bytes = match call_with_timeout(tts.name(), limit, tts.synthesize(&request)).await {
                Ok(bytes) => bytes,
                Err(CollaboratorError::TimedOut { seconds, .. }) => {
                    return Err(StageError::Timeout {
                        stage: "synthesis",
                        seconds,
                    });
                }
                Err(e) => return Err(tts_failed(e)),
            };
            if bytes.is_empty() {
                return Err(tts_failed(format!(
                    "empty audio for chunk {} of {}",
                    index + 1,
                    chunks.len()
                )));
            }
            debug!(job_id = %job_id, chunk = index + 1, bytes = bytes.len(), "Chunk synthesized");
            audio.extend_from_slice(&bytes);
        }

        let audio_path = ctx.cache.store(&key, &audio).await?;
        SynthesisResult {
            audio_path,
            settings: settings.clone(),
            was_cached: false,
            cache_key: key.digest.clone(),
            chunks: chunks.len(),
        }
    };
    drop(claim);

    ctx.store
        .update(
            job_id,
            JobUpdate {
                synthesis_attempt: Some(result.clone()),
                ..Default::default()
            },
        )
        .await?;
    ctx.store
        .append_event(
            job_id,
            "Synthesis complete",
            Some(Stage::Synthesis),
            Some(json!({
                "attempt": attempt,
                "audio_path": result.audio_path,
                "was_cached": result.was_cached,
                "settings": result.settings,
            })),
        )
        .await?;

    info!(
        job_id = %job_id,
        attempt,
        was_cached = result.was_cached,
        audio_path = %result.audio_path.display(),
        "Synthesis complete"
    );
    Ok(result)
}
