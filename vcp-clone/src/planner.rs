//! Optional planning strategy consulted before the deterministic pipeline
//!
//! A planner may tune the initial voice settings or leave notes on the job.
//! It never replaces the pipeline; failures are recorded and ignored.

use crate::error::CollaboratorError;
use crate::models::{JobId, Mode, VoiceSettings};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Input handed to a planner
#[derive(Debug, Clone, PartialEq)]
pub struct PlanContext {
    pub job_id: JobId,
    pub voice_id: String,
    pub text: String,
    pub mode: Mode,
    pub has_reference_audio: bool,
    /// Settings the pipeline would use without a planner
    pub settings: VoiceSettings,
}

/// Partial override of the initial voice settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsAdjustment {
    pub stability: Option<f64>,
    pub similarity_boost: Option<f64>,
    pub style: Option<f64>,
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanAction {
    AdjustSettings(SettingsAdjustment),
    Note { message: String },
}

#[async_trait]
pub trait Planner: Send + Sync {
    fn name(&self) -> &str;

    async fn plan(&self, context: &PlanContext) -> Result<Vec<PlanAction>, CollaboratorError>;
}

fn unit(value: f64) -> Option<f64> {
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

/// Apply planner actions to `settings`; returns the adjusted settings and notes
///
/// Values are clamped to [0, 1] (speed to (0, 4]); non-finite values are
/// ignored.
pub fn apply_actions(settings: &VoiceSettings, actions: &[PlanAction]) -> (VoiceSettings, Vec<String>) {
    let mut adjusted = settings.clone();
    let mut notes = Vec::new();

    for action in actions {
        match action {
            PlanAction::AdjustSettings(adjustment) => {
                if let Some(v) = adjustment.stability.and_then(unit) {
                    adjusted.stability = v;
                }
                if let Some(v) = adjustment.similarity_boost.and_then(unit) {
                    adjusted.similarity_boost = v;
                }
                if let Some(v) = adjustment.style.and_then(unit) {
                    adjusted.style = v;
                }
                if let Some(speed) = adjustment.speed.filter(|s| s.is_finite() && *s > 0.0) {
                    adjusted.speed = speed.min(4.0);
                }
            }
            PlanAction::Note { message } => notes.push(message.clone()),
        }
    }

    (adjusted, notes)
}
