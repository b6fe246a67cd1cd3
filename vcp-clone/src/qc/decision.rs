//! Gate evaluation and the single retry adjustment

use crate::models::{QcGates, QcMetrics, RetryCaps, VoiceSettings};

/// Upper bound on QC-driven re-synthesis per job
pub const MAX_AUTOMATIC_RETRIES: u8 = 1;

/// Outcome of checking one set of metrics against the gates
#[derive(Debug, Clone, PartialEq)]
pub struct GateVerdict {
    pub wer_ok: bool,
    /// True when the speaker gate passed or did not apply
    pub cosine_ok: bool,
    /// Human-readable description of each failed gate
    pub reasons: Vec<String>,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.wer_ok && self.cosine_ok
    }
}

/// Pass iff `wer <= max_wer` and `cosine >= min_cosine`
///
/// A missing cosine (no reference audio) leaves only the WER gate.
pub fn evaluate_gates(metrics: &QcMetrics, gates: &QcGates) -> GateVerdict {
    let mut reasons = Vec::new();

    let wer_ok = metrics.wer <= gates.max_wer;
    if !wer_ok {
        reasons.push(format!("wer {:.3} > {:.3}", metrics.wer, gates.max_wer));
    }

    let cosine_ok = match metrics.speaker_cosine {
        Some(cosine) if cosine < gates.min_cosine => {
            reasons.push(format!("speaker cosine {:.3} < {:.3}", cosine, gates.min_cosine));
            false
        }
        _ => true,
    };

    GateVerdict {
        wer_ok,
        cosine_ok,
        reasons,
    }
}

/// Settings for the retry after a failed verdict
///
/// Only a speaker-gate failure changes anything: similarity_boost and
/// stability are each bumped and capped. WER failures retry with the same
/// settings (served from the cache).
pub fn adjust_for_retry(settings: &VoiceSettings, verdict: &GateVerdict, caps: &RetryCaps) -> VoiceSettings {
    let mut adjusted = settings.clone();
    if !verdict.cosine_ok {
        adjusted.similarity_boost =
            (settings.similarity_boost + caps.cosine_bump_similarity).min(caps.similarity_cap);
        adjusted.stability = (settings.stability + caps.cosine_bump_stability).min(caps.stability_cap);
    }
    adjusted
}
