//! Configuration for vcp-clone
//!
//! TOML file (all sections optional) → `VCP_*` environment overrides →
//! resolved [`PipelineSettings`]. The ElevenLabs API key is resolved
//! separately from environment and TOML.

use crate::models::{AdmissionLimits, QcGates, RetryCaps, VoiceDefaults};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use vcp_common::config::{env_override, LoggingConfig};
use vcp_common::{Error, Result};

/// Module name used for the default config file (`vcp-clone.toml`)
pub const MODULE_NAME: &str = "vcp-clone";

pub const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";
pub const DEFAULT_OUTPUT_FORMAT: &str = "mp3_44100_128";
pub const DEFAULT_ELEVENLABS_URL: &str = "https://api.elevenlabs.io";

/// API key environment variables, in priority order
pub const API_KEY_ENV_VARS: [&str; 2] = ["ELEVEN_API_KEY", "ELEVENLABS_API_KEY"];

/// vcp-clone TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub elevenlabs: ElevenLabsConfig,
    pub collaborators: CollaboratorCommands,
    pub defaults: VoiceDefaults,
    pub gates: QcGates,
    pub retry: RetryCaps,
    pub limits: AdmissionLimits,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevenLabsConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model_id: String,
    pub output_format: String,
    /// Provider request rate limit
    pub requests_per_second: u32,
    /// Total HTTP request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_ELEVENLABS_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            requests_per_second: 2,
            request_timeout_secs: 120,
        }
    }
}

/// External program invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Command-line collaborators (absent → capability not configured)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorCommands {
    pub cleaner: Option<CommandSpec>,
    pub transcriber: Option<CommandSpec>,
    pub similarity: Option<CommandSpec>,
}

/// What to do when the speaker-similarity scorer cannot produce a score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerFallback {
    /// Fail the job (no retry)
    #[default]
    Fail,
    /// Substitute `neutral_cosine` and continue
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_chunk_chars: usize,
    pub max_concurrent_jobs: usize,
    pub scorer_fallback: ScorerFallback,
    pub neutral_cosine: f64,
    pub timeouts: TimeoutsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 2500,
            max_concurrent_jobs: 4,
            scorer_fallback: ScorerFallback::Fail,
            neutral_cosine: 0.5,
            timeouts: TimeoutsConfig::default(),
        }
    }
}

/// Per-stage collaborator timeouts, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub preprocess_secs: f64,
    /// Per chunk
    pub synthesis_secs: f64,
    pub transcription_secs: f64,
    pub similarity_secs: f64,
    pub planner_secs: f64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            preprocess_secs: 300.0,
            synthesis_secs: 120.0,
            transcription_secs: 120.0,
            similarity_secs: 120.0,
            planner_secs: 60.0,
        }
    }
}

fn to_duration(name: &str, secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(Error::Config(format!(
            "pipeline.timeouts.{} must be a positive number of seconds, got {}",
            name, secs
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::Config(format!("pipeline.timeouts.{}: {}", name, e)))
}

/// Resolved stage timeouts
#[derive(Debug, Clone, PartialEq)]
pub struct StageTimeouts {
    pub preprocess: Duration,
    pub synthesis: Duration,
    pub transcription: Duration,
    pub similarity: Duration,
    pub planner: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            preprocess: Duration::from_secs(300),
            synthesis: Duration::from_secs(120),
            transcription: Duration::from_secs(120),
            similarity: Duration::from_secs(120),
            planner: Duration::from_secs(60),
        }
    }
}

impl TryFrom<&TimeoutsConfig> for StageTimeouts {
    type Error = Error;

    fn try_from(config: &TimeoutsConfig) -> Result<Self> {
        Ok(Self {
            preprocess: to_duration("preprocess_secs", config.preprocess_secs)?,
            synthesis: to_duration("synthesis_secs", config.synthesis_secs)?,
            transcription: to_duration("transcription_secs", config.transcription_secs)?,
            similarity: to_duration("similarity_secs", config.similarity_secs)?,
            planner: to_duration("planner_secs", config.planner_secs)?,
        })
    }
}

/// Provider-side synthesis settings
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisSettings {
    pub model_id: String,
    pub output_format: String,
    /// Maximum characters per TTS call
    pub max_chunk_chars: usize,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            max_chunk_chars: 2500,
        }
    }
}

/// Runtime settings shared by admission and every stage
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub defaults: VoiceDefaults,
    pub gates: QcGates,
    pub retry: RetryCaps,
    pub limits: AdmissionLimits,
    pub synthesis: SynthesisSettings,
    pub max_concurrent_jobs: usize,
    pub scorer_fallback: ScorerFallback,
    pub neutral_cosine: f64,
    pub timeouts: StageTimeouts,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            defaults: VoiceDefaults::default(),
            gates: QcGates::default(),
            retry: RetryCaps::default(),
            limits: AdmissionLimits::default(),
            synthesis: SynthesisSettings::default(),
            max_concurrent_jobs: 4,
            scorer_fallback: ScorerFallback::Fail,
            neutral_cosine: 0.5,
            timeouts: StageTimeouts::default(),
        }
    }
}

fn apply_env<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Some(value) = env_override(name) {
        info!("{} overridden from environment", name);
        *target = value;
    }
}

impl PipelineSettings {
    /// Resolve settings from TOML values plus `VCP_*` environment overrides
    pub fn resolve(config: &TomlConfig) -> Result<Self> {
        let mut defaults = config.defaults.clone();
        apply_env("VCP_STABILITY_DEFAULT", &mut defaults.stability);
        apply_env("VCP_DIALOGUE_STABILITY_DEFAULT", &mut defaults.dialogue_stability);
        apply_env("VCP_SIMILARITY_DEFAULT", &mut defaults.similarity_boost);
        apply_env("VCP_STYLE_DEFAULT", &mut defaults.style);
        apply_env("VCP_SPEED_DEFAULT", &mut defaults.speed);

        let mut gates = config.gates.clone();
        apply_env("VCP_WER_THRESHOLD", &mut gates.max_wer);
        apply_env("VCP_COSINE_THRESHOLD", &mut gates.min_cosine);

        let mut retry = config.retry.clone();
        apply_env("VCP_COSINE_BUMP_STABILITY", &mut retry.cosine_bump_stability);
        apply_env("VCP_COSINE_BUMP_SIMILARITY", &mut retry.cosine_bump_similarity);
        apply_env("VCP_STABILITY_CAP", &mut retry.stability_cap);
        apply_env("VCP_SIMILARITY_CAP", &mut retry.similarity_cap);

        let mut model_id = config.elevenlabs.model_id.clone();
        apply_env("VCP_ELEVENLABS_MODEL_ID", &mut model_id);

        let pipeline = &config.pipeline;
        if pipeline.max_concurrent_jobs == 0 {
            return Err(Error::Config(
                "pipeline.max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if pipeline.max_chunk_chars == 0 {
            return Err(Error::Config(
                "pipeline.max_chunk_chars must be at least 1".to_string(),
            ));
        }
        if !pipeline.neutral_cosine.is_finite() || !(-1.0..=1.0).contains(&pipeline.neutral_cosine)
        {
            return Err(Error::Config(format!(
                "pipeline.neutral_cosine must be within [-1, 1], got {}",
                pipeline.neutral_cosine
            )));
        }

        Ok(Self {
            defaults,
            gates,
            retry,
            limits: config.limits.clone(),
            synthesis: SynthesisSettings {
                model_id,
                output_format: config.elevenlabs.output_format.clone(),
                max_chunk_chars: pipeline.max_chunk_chars,
            },
            max_concurrent_jobs: pipeline.max_concurrent_jobs,
            scorer_fallback: pipeline.scorer_fallback,
            neutral_cosine: pipeline.neutral_cosine,
            timeouts: StageTimeouts::try_from(&pipeline.timeouts)?,
        })
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve the ElevenLabs API key
///
/// **Priority:** `ELEVEN_API_KEY` → `ELEVENLABS_API_KEY` → TOML `elevenlabs.api_key`
pub fn resolve_elevenlabs_api_key(config: &TomlConfig) -> Result<String> {
    let mut candidates: Vec<(&str, String)> = API_KEY_ENV_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok().map(|key| (*name, key)))
        .collect();
    if let Some(key) = &config.elevenlabs.api_key {
        candidates.push(("TOML", key.clone()));
    }
    candidates.retain(|(_, key)| is_valid_key(key));

    if candidates.len() > 1 {
        let sources: Vec<&str> = candidates.iter().map(|(source, _)| *source).collect();
        warn!(
            "ElevenLabs API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    match candidates.into_iter().next() {
        Some((source, key)) => {
            info!("ElevenLabs API key loaded from {}", source);
            Ok(key.trim().to_string())
        }
        None => Err(Error::Config(
            "ElevenLabs API key not configured. Set one of:\n\
             1. Environment: ELEVEN_API_KEY=your-key-here\n\
             2. Environment: ELEVENLABS_API_KEY=your-key-here\n\
             3. TOML config: ~/.config/vcp/vcp-clone.toml ([elevenlabs] api_key = \"your-key\")"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in API_KEY_ENV_VARS {
            std::env::remove_var(name);
        }
        for name in [
            "VCP_STABILITY_DEFAULT",
            "VCP_WER_THRESHOLD",
            "VCP_ELEVENLABS_MODEL_ID",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn empty_toml_gives_compiled_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config.defaults, VoiceDefaults::default());
        assert_eq!(config.elevenlabs.model_id, DEFAULT_MODEL_ID);
        assert_eq!(config.pipeline.scorer_fallback, ScorerFallback::Fail);
        assert_eq!(config.limits.max_text_length, 800);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [gates]
            max_wer = 0.2

            [pipeline]
            scorer_fallback = "neutral"

            [pipeline.timeouts]
            synthesis_secs = 30

            [collaborators.transcriber]
            program = "/opt/asr/transcribe"
            "#,
        )
        .unwrap();

        assert_eq!(config.gates.max_wer, 0.2);
        assert_eq!(config.gates.min_cosine, 0.85);
        assert_eq!(config.pipeline.scorer_fallback, ScorerFallback::Neutral);
        assert_eq!(config.pipeline.timeouts.synthesis_secs, 30.0);
        assert_eq!(config.pipeline.timeouts.preprocess_secs, 300.0);
        let transcriber = config.collaborators.transcriber.unwrap();
        assert!(transcriber.args.is_empty());
    }

    #[test]
    fn written_config_loads_back() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("vcp").join("vcp-clone.toml");
        let mut config = TomlConfig {
            root_folder: Some(temp.path().join("root")),
            ..TomlConfig::default()
        };
        config.pipeline.scorer_fallback = ScorerFallback::Neutral;

        vcp_common::config::write_toml_config(&config, &path).unwrap();
        let loaded: TomlConfig = vcp_common::config::load_toml_or_default(&path).unwrap();

        assert_eq!(loaded.root_folder, config.root_folder);
        assert_eq!(loaded.defaults, VoiceDefaults::default());
        assert_eq!(loaded.pipeline.scorer_fallback, ScorerFallback::Neutral);
        assert_eq!(loaded.pipeline.timeouts.synthesis_secs, 120.0);
        assert!(loaded.collaborators.cleaner.is_none());
    }

    #[test]
    #[serial]
    fn env_overrides_toml_values() {
        clear_env();
        let mut config = TomlConfig::default();
        config.defaults.stability = 0.4;

        std::env::set_var("VCP_STABILITY_DEFAULT", "0.6");
        std::env::set_var("VCP_WER_THRESHOLD", "garbage");
        std::env::set_var("VCP_ELEVENLABS_MODEL_ID", "eleven_turbo_v2_5");
        let settings = PipelineSettings::resolve(&config).unwrap();
        clear_env();

        assert_eq!(settings.defaults.stability, 0.6);
        assert_eq!(settings.gates.max_wer, 0.10);
        assert_eq!(settings.synthesis.model_id, "eleven_turbo_v2_5");
    }

    #[test]
    #[serial]
    fn invalid_pipeline_values_are_config_errors() {
        clear_env();
        let mut config = TomlConfig::default();
        config.pipeline.timeouts.synthesis_secs = 0.0;
        assert!(matches!(
            PipelineSettings::resolve(&config),
            Err(Error::Config(_))
        ));

        let mut config = TomlConfig::default();
        config.pipeline.max_concurrent_jobs = 0;
        assert!(PipelineSettings::resolve(&config).is_err());
    }

    #[test]
    #[serial]
    fn api_key_priority_env_then_toml() {
        clear_env();
        let mut config = TomlConfig::default();
        config.elevenlabs.api_key = Some("toml-key".to_string());
        assert_eq!(resolve_elevenlabs_api_key(&config).unwrap(), "toml-key");

        std::env::set_var("ELEVENLABS_API_KEY", "second-key");
        assert_eq!(resolve_elevenlabs_api_key(&config).unwrap(), "second-key");

        std::env::set_var("ELEVEN_API_KEY", "first-key");
        assert_eq!(resolve_elevenlabs_api_key(&config).unwrap(), "first-key");
        clear_env();
    }

    #[test]
    #[serial]
    fn whitespace_key_is_not_a_key() {
        clear_env();
        std::env::set_var("ELEVEN_API_KEY", "   ");
        let result = resolve_elevenlabs_api_key(&TomlConfig::default());
        clear_env();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
