//! Collaborator-backed scoring of one synthesized take

use super::metrics::word_error_rate;
use crate::collaborators::Collaborators;
use crate::config::{PipelineSettings, ScorerFallback};
use crate::error::CollaboratorError;
use crate::models::QcMetrics;
use crate::stages::call_with_timeout;
use std::path::Path;
use tracing::warn;

/// Metrics plus anything the decision needs to know about how they were obtained
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTake {
    pub metrics: QcMetrics,
    pub notes: Vec<String>,
    /// Set when the speaker scorer failed under [`ScorerFallback::Fail`]
    pub scorer_failure: Option<String>,
}

fn checked_cosine(name: &str, score: f64) -> Result<f64, CollaboratorError> {
    if score.is_finite() && (-1.0..=1.0).contains(&score) {
        Ok(score)
    } else {
        Err(CollaboratorError::invalid_output(
            name,
            format!("similarity {} outside [-1, 1]", score),
        ))
    }
}

/// Transcribe and compare `audio`
///
/// Transcription and speaker scoring run concurrently. Neither failure
/// aborts scoring: an ASR failure counts as WER 1.0, a scorer failure is
/// resolved by the configured [`ScorerFallback`].
pub async fn score_take(
    collaborators: &Collaborators,
    settings: &PipelineSettings,
    text: &str,
    audio: &Path,
    reference: Option<&Path>,
) -> ScoredTake {
    let transcriber = &collaborators.transcriber;
    let scorer = &collaborators.similarity;

    let transcription = call_with_timeout(
        transcriber.name(),
        settings.timeouts.transcription,
        transcriber.transcribe(audio),
    );
    let similarity = async {
        match reference {
            Some(reference) => Some(
                call_with_timeout(
                    scorer.name(),
                    settings.timeouts.similarity,
                    scorer.similarity(reference, audio),
                )
                .await
                .and_then(|score| checked_cosine(scorer.name(), score)),
            ),
            None => None,
        }
    };
    let (transcription, similarity) = tokio::join!(transcription, similarity);

    let mut notes = Vec::new();
    let mut scorer_failure = None;

    let (wer, transcript) = match transcription {
        Ok(transcript) => (word_error_rate(text, &transcript), transcript),
        Err(e) => {
            warn!(error = %e, "Transcription unavailable; counting WER as 1.0");
            notes.push(format!("transcription unavailable: {}", e));
            (1.0, String::new())
        }
    };

    let speaker_cosine = match similarity {
        None => {
            notes.push("no reference audio; speaker gate skipped".to_string());
            None
        }
        Some(Ok(score)) => Some(score),
        Some(Err(e)) => match settings.scorer_fallback {
            ScorerFallback::Fail => {
                warn!(error = %e, "Speaker similarity unavailable");
                scorer_failure = Some(e.to_string());
                None
            }
            ScorerFallback::Neutral => {
                warn!(error = %e, neutral = settings.neutral_cosine, "Speaker similarity unavailable; using neutral score");
                notes.push(format!(
                    "speaker similarity unavailable ({}); neutral cosine {} substituted",
                    e, settings.neutral_cosine
                ));
                Some(settings.neutral_cosine)
            }
        },
    };

    ScoredTake {
        metrics: QcMetrics {
            wer,
            speaker_cosine,
            transcript,
        },
        notes,
        scorer_failure,
    }
}
