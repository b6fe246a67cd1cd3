//! External collaborators behind async traits
//!
//! Audio cleanup, TTS, speech recognition and speaker similarity are all
//! out-of-process capabilities. The pipeline only sees these traits, so
//! tests inject scripted fakes and deployments pick concrete adapters.

pub mod command;
pub mod elevenlabs;

pub use command::{CommandCleaner, CommandSimilarity, CommandTranscriber};
pub use elevenlabs::ElevenLabsClient;

use crate::config::{resolve_elevenlabs_api_key, TomlConfig};
use crate::error::CollaboratorError;
use crate::models::VoiceSettings;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Result of reference audio cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Cleaned single-speaker mono waveform
    Clean(PathBuf),
    /// Structured refusal (e.g. silence-only or multi-speaker input)
    Unusable(String),
}

/// Reference audio cleanup (noise reduction, diarization, mono conversion)
#[async_trait]
pub trait AudioCleaner: Send + Sync {
    fn name(&self) -> &str;

    /// Clean `raw_audio`, writing output beneath `output_dir`
    async fn clean(
        &self,
        raw_audio: &Path,
        output_dir: &Path,
    ) -> Result<CleanupOutcome, CollaboratorError>;
}

/// One TTS call
#[derive(Debug, Clone, PartialEq)]
pub struct TtsRequest {
    pub voice_id: String,
    pub text: String,
    pub settings: VoiceSettings,
}

/// Text-to-speech provider; returns raw encoded audio bytes
#[async_trait]
pub trait TtsProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, request: &TtsRequest) -> Result<Vec<u8>, CollaboratorError>;
}

/// Speech recognition (best-effort transcript)
#[async_trait]
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &str;

    async fn transcribe(&self, audio: &Path) -> Result<String, CollaboratorError>;
}

/// Speaker-embedding similarity between two recordings
#[async_trait]
pub trait SpeakerSimilarity: Send + Sync {
    fn name(&self) -> &str;

    /// Cosine similarity in [-1, 1]
    async fn similarity(&self, reference: &Path, candidate: &Path)
        -> Result<f64, CollaboratorError>;
}

/// Placeholder for a capability with no configured adapter
#[derive(Debug, Clone, Copy)]
pub struct Unconfigured(pub &'static str);

#[async_trait]
impl AudioCleaner for Unconfigured {
    fn name(&self) -> &str {
        self.0
    }

    async fn clean(
        &self,
        _raw_audio: &Path,
        _output_dir: &Path,
    ) -> Result<CleanupOutcome, CollaboratorError> {
        Err(CollaboratorError::NotConfigured(self.0))
    }
}

#[async_trait]
impl TtsProvider for Unconfigured {
    fn name(&self) -> &str {
        self.0
    }

    async fn synthesize(&self, _request: &TtsRequest) -> Result<Vec<u8>, CollaboratorError> {
        Err(CollaboratorError::NotConfigured(self.0))
    }
}

#[async_trait]
impl Transcriber for Unconfigured {
    fn name(&self) -> &str {
        self.0
    }

    async fn transcribe(&self, _audio: &Path) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::NotConfigured(self.0))
    }
}

#[async_trait]
impl SpeakerSimilarity for Unconfigured {
    fn name(&self) -> &str {
        self.0
    }

    async fn similarity(&self, _reference: &Path, _candidate: &Path) -> Result<f64, CollaboratorError> {
        Err(CollaboratorError::NotConfigured(self.0))
    }
}

/// The full collaborator set handed to the pipeline
#[derive(Clone)]
pub struct Collaborators {
    pub cleaner: Arc<dyn AudioCleaner>,
    pub tts: Arc<dyn TtsProvider>,
    pub transcriber: Arc<dyn Transcriber>,
    pub similarity: Arc<dyn SpeakerSimilarity>,
}

impl Collaborators {
    /// Build adapters from configuration
    ///
    /// Missing configuration leaves a capability unconfigured (with a
    /// warning); jobs that need it fail at the corresponding stage.
    pub fn from_config(config: &TomlConfig) -> Self {
        let tts: Arc<dyn TtsProvider> = match resolve_elevenlabs_api_key(config) {
            Ok(api_key) => match ElevenLabsClient::new(&config.elevenlabs, api_key) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    warn!("ElevenLabs client unavailable: {}", e);
                    Arc::new(Unconfigured("elevenlabs"))
                }
            },
            Err(e) => {
                warn!("{}", e);
                Arc::new(Unconfigured("elevenlabs"))
            }
        };

        let commands = &config.collaborators;
        let cleaner: Arc<dyn AudioCleaner> = match &commands.cleaner {
            Some(spec) => Arc::new(CommandCleaner::new(spec.clone())),
            None => Arc::new(Unconfigured("audio cleanup")),
        };
        let transcriber: Arc<dyn Transcriber> = match &commands.transcriber {
            Some(spec) => Arc::new(CommandTranscriber::new(spec.clone())),
            None => {
                warn!("No transcriber configured; WER gate will fail every job");
                Arc::new(Unconfigured("transcription"))
            }
        };
        let similarity: Arc<dyn SpeakerSimilarity> = match &commands.similarity {
            Some(spec) => Arc::new(CommandSimilarity::new(spec.clone())),
            None => Arc::new(Unconfigured("speaker similarity")),
        };

        Self {
            cleaner,
            tts,
            transcriber,
            similarity,
        }
    }
}
