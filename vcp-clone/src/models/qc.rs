//! QC metrics, reports and the final job result

use crate::models::SynthesisResult;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Scores for one verification pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcMetrics {
    pub wer: f64,
    /// None when no reference audio was supplied
    pub speaker_cosine: Option<f64>,
    pub transcript: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QcDecision {
    Pass,
    Fail,
}

/// Outcome of the QC decision engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcReport {
    pub decision: QcDecision,
    /// Metrics from the last verification pass
    pub metrics: QcMetrics,
    /// 0 or 1
    pub retries_used: u8,
    #[serde(default)]
    pub notes: Vec<String>,
    pub final_audio_path: PathBuf,
}

/// Result record of a completed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub voice_id: String,
    pub audio_path: PathBuf,
    pub synthesis: SynthesisResult,
    pub qc: QcReport,
    #[serde(default)]
    pub clean_reference_path: Option<PathBuf>,
}
