//! Clone request admission and resolved job payload
//!
//! A [`CloneRequest`] arrives with optional tuning overrides. It is resolved
//! once, at admission, into a [`JobPayload`] where every value is concrete, so
//! the persisted record fully describes what the pipeline will do. Each field
//! a request leaves out takes the configured value.

use crate::config::PipelineSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vcp_common::{Error, Result};

/// Delivery mode; selects the initial stability value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Narration,
    Dialogue,
}

/// Initial voice tuning values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceDefaults {
    /// Stability used in narration mode
    pub stability: f64,
    /// Stability used in dialogue mode (more expressive)
    pub dialogue_stability: f64,
    pub similarity_boost: f64,
    pub style: f64,
    pub speed: f64,
}

impl Default for VoiceDefaults {
    fn default() -> Self {
        Self {
            stability: 0.55,
            dialogue_stability: 0.35,
            similarity_boost: 0.7,
            style: 0.0,
            speed: 1.0,
        }
    }
}

/// QC gate thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QcGates {
    pub max_wer: f64,
    pub min_cosine: f64,
}

impl Default for QcGates {
    fn default() -> Self {
        Self {
            max_wer: 0.10,
            min_cosine: 0.85,
        }
    }
}

/// Parameter bumps applied by the single QC retry, and their caps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryCaps {
    pub cosine_bump_stability: f64,
    pub cosine_bump_similarity: f64,
    pub stability_cap: f64,
    pub similarity_cap: f64,
}

impl Default for RetryCaps {
    fn default() -> Self {
        Self {
            cosine_bump_stability: 0.10,
            cosine_bump_similarity: 0.10,
            stability_cap: 0.75,
            similarity_cap: 1.0,
        }
    }
}

/// Admission limits checked by the policy guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionLimits {
    /// Maximum script length in characters
    pub max_text_length: usize,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            max_text_length: 800,
        }
    }
}

/// Request-side overrides of [`VoiceDefaults`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceDefaultsOverride {
    pub stability: Option<f64>,
    pub dialogue_stability: Option<f64>,
    pub similarity_boost: Option<f64>,
    pub style: Option<f64>,
    pub speed: Option<f64>,
}

impl VoiceDefaultsOverride {
    fn merged(self, base: &VoiceDefaults) -> VoiceDefaults {
        VoiceDefaults {
            stability: self.stability.unwrap_or(base.stability),
            dialogue_stability: self.dialogue_stability.unwrap_or(base.dialogue_stability),
            similarity_boost: self.similarity_boost.unwrap_or(base.similarity_boost),
            style: self.style.unwrap_or(base.style),
            speed: self.speed.unwrap_or(base.speed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QcGatesOverride {
    pub max_wer: Option<f64>,
    pub min_cosine: Option<f64>,
}

impl QcGatesOverride {
    fn merged(self, base: &QcGates) -> QcGates {
        QcGates {
            max_wer: self.max_wer.unwrap_or(base.max_wer),
            min_cosine: self.min_cosine.unwrap_or(base.min_cosine),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryCapsOverride {
    pub cosine_bump_stability: Option<f64>,
    pub cosine_bump_similarity: Option<f64>,
    pub stability_cap: Option<f64>,
    pub similarity_cap: Option<f64>,
}

impl RetryCapsOverride {
    fn merged(self, base: &RetryCaps) -> RetryCaps {
        RetryCaps {
            cosine_bump_stability: self.cosine_bump_stability.unwrap_or(base.cosine_bump_stability),
            cosine_bump_similarity: self
                .cosine_bump_similarity
                .unwrap_or(base.cosine_bump_similarity),
            stability_cap: self.stability_cap.unwrap_or(base.stability_cap),
            similarity_cap: self.similarity_cap.unwrap_or(base.similarity_cap),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionLimitsOverride {
    pub max_text_length: Option<usize>,
}

impl AdmissionLimitsOverride {
    fn merged(self, base: &AdmissionLimits) -> AdmissionLimits {
        AdmissionLimits {
            max_text_length: self.max_text_length.unwrap_or(base.max_text_length),
        }
    }
}

/// Incoming clone request (omitted tuning fields take the configured values)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloneRequest {
    pub voice_id: String,
    pub text: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub consent_flag: bool,
    /// Raw reference recording (absolute path); enables ingest and the speaker gate
    #[serde(default)]
    pub raw_audio_path: Option<PathBuf>,
    #[serde(default)]
    pub defaults: Option<VoiceDefaultsOverride>,
    #[serde(default)]
    pub gates: Option<QcGatesOverride>,
    #[serde(default)]
    pub retry: Option<RetryCapsOverride>,
    #[serde(default)]
    pub limits: Option<AdmissionLimitsOverride>,
    /// Consult the installed planner before the deterministic pipeline
    #[serde(default)]
    pub use_planner: bool,
}

/// Fully resolved job input, persisted with the job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub voice_id: String,
    pub text: String,
    pub mode: Mode,
    pub provider: String,
    pub consent_flag: bool,
    #[serde(default)]
    pub raw_audio_path: Option<PathBuf>,
    pub defaults: VoiceDefaults,
    pub gates: QcGates,
    pub retry: RetryCaps,
    pub limits: AdmissionLimits,
    #[serde(default)]
    pub use_planner: bool,
}

impl CloneRequest {
    pub fn new(voice_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    /// Merge overrides over `settings` and validate the result
    pub fn resolve(self, settings: &PipelineSettings) -> Result<JobPayload> {
        let payload = JobPayload {
            voice_id: self.voice_id.trim().to_string(),
            text: self.text,
            mode: self.mode,
            provider: self.provider.unwrap_or_default(),
            consent_flag: self.consent_flag,
            raw_audio_path: self.raw_audio_path,
            defaults: self.defaults.unwrap_or_default().merged(&settings.defaults),
            gates: self.gates.unwrap_or_default().merged(&settings.gates),
            retry: self.retry.unwrap_or_default().merged(&settings.retry),
            limits: self.limits.unwrap_or_default().merged(&settings.limits),
            use_planner: self.use_planner,
        };
        payload.validate()?;
        Ok(payload)
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(Error::InvalidInput(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

impl JobPayload {
    /// Structural validation (policy decisions are left to the policy guard)
    pub fn validate(&self) -> Result<()> {
        if self.voice_id.trim().is_empty() {
            return Err(Error::InvalidInput("voice_id must not be empty".to_string()));
        }
        if self.text.trim().is_empty() {
            return Err(Error::InvalidInput("text must not be empty".to_string()));
        }
        if let Some(path) = &self.raw_audio_path {
            if !path.is_absolute() {
                return Err(Error::InvalidInput(format!(
                    "raw_audio_path must be absolute: {}",
                    path.display()
                )));
            }
        }

        let d = &self.defaults;
        check_unit("defaults.stability", d.stability)?;
        check_unit("defaults.dialogue_stability", d.dialogue_stability)?;
        check_unit("defaults.similarity_boost", d.similarity_boost)?;
        check_unit("defaults.style", d.style)?;
        if !d.speed.is_finite() || d.speed <= 0.0 || d.speed > 4.0 {
            return Err(Error::InvalidInput(format!(
                "defaults.speed must be within (0, 4], got {}",
                d.speed
            )));
        }

        check_unit("gates.max_wer", self.gates.max_wer)?;
        let min_cosine = self.gates.min_cosine;
        if !min_cosine.is_finite() || !(-1.0..=1.0).contains(&min_cosine) {
            return Err(Error::InvalidInput(format!(
                "gates.min_cosine must be within [-1, 1], got {}",
                min_cosine
            )));
        }

        let r = &self.retry;
        check_unit("retry.cosine_bump_stability", r.cosine_bump_stability)?;
        check_unit("retry.cosine_bump_similarity", r.cosine_bump_similarity)?;
        check_unit("retry.stability_cap", r.stability_cap)?;
        check_unit("retry.similarity_cap", r.similarity_cap)?;

        Ok(())
    }

    /// Stability for the payload's mode
    pub fn initial_stability(&self) -> f64 {
        match self.mode {
            Mode::Dialogue => self.defaults.dialogue_stability,
            Mode::Narration => self.defaults.stability,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(voice_id: &str, text: &str) -> Self {
        Self {
            voice_id: voice_id.to_string(),
            text: text.to_string(),
            mode: Mode::Narration,
            provider: "elevenlabs".to_string(),
            consent_flag: true,
            raw_audio_path: None,
            defaults: VoiceDefaults::default(),
            gates: QcGates::default(),
            retry: RetryCaps::default(),
            limits: AdmissionLimits::default(),
            use_planner: false,
        }
    }
}
