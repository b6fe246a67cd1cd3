//! Synthesis parameters and results

use crate::config::SynthesisSettings;
use crate::models::JobPayload;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Full parameter set for one TTS call (also the cache key input)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f64,
    pub similarity_boost: f64,
    pub style: f64,
    pub speed: f64,
    pub model_id: String,
    pub output_format: String,
}

impl VoiceSettings {
    /// Initial settings for a payload: stability chosen by mode
    pub fn initial(payload: &JobPayload, synthesis: &SynthesisSettings) -> Self {
        Self {
            stability: payload.initial_stability(),
            similarity_boost: payload.defaults.similarity_boost,
            style: payload.defaults.style,
            speed: payload.defaults.speed,
            model_id: synthesis.model_id.clone(),
            output_format: synthesis.output_format.clone(),
        }
    }
}

/// Output of the synthesize stage; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub audio_path: PathBuf,
    pub settings: VoiceSettings,
    pub was_cached: bool,
    pub cache_key: String,
    /// Number of provider calls made (0 on cache hit)
    #[serde(default)]
    pub chunks: usize,
}
