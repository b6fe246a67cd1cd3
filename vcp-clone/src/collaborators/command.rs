//! Adapters that run an external program and read one JSON object from stdout
//!
//! The program receives the configured arguments followed by the audio
//! path(s). The last non-empty stdout line must be the JSON result.

use super::{AudioCleaner, CleanupOutcome, SpeakerSimilarity, Transcriber};
use crate::config::CommandSpec;
use crate::error::CollaboratorError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Run `spec` with extra arguments and decode the JSON result line
async fn run_json<T: DeserializeOwned>(
    name: &str,
    spec: &CommandSpec,
    extra_args: &[OsString],
) -> Result<T, CollaboratorError> {
    tracing::debug!(
        collaborator = name,
        program = %spec.program.display(),
        "Running collaborator command"
    );

    let output = Command::new(&spec.program)
        .args(&spec.args)
        .args(extra_args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            CollaboratorError::request(
                name,
                format!("failed to run {}: {}", spec.program.display(), e),
            )
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        // Last 300 characters are enough to identify the failure
        let start = stderr
            .char_indices()
            .rev()
            .nth(299)
            .map_or(0, |(idx, _)| idx);
        return Err(CollaboratorError::request(
            name,
            format!("exited with {}: {}", output.status, &stderr[start..]),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| CollaboratorError::invalid_output(name, "no output"))?;

    serde_json::from_str(line).map_err(|e| CollaboratorError::invalid_output(name, e))
}

#[derive(Debug, Deserialize)]
struct CleanerOutput {
    clean_path: Option<PathBuf>,
    error: Option<String>,
}

impl CleanerOutput {
    fn into_outcome(self, name: &str) -> Result<CleanupOutcome, CollaboratorError> {
        match (self.clean_path, self.error) {
            (_, Some(reason)) => Ok(CleanupOutcome::Unusable(reason)),
            (Some(path), None) => Ok(CleanupOutcome::Clean(path)),
            (None, None) => Err(CollaboratorError::invalid_output(
                name,
                "neither clean_path nor error present",
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriberOutput {
    #[serde(alias = "fullText")]
    text: String,
}

#[derive(Debug, Deserialize)]
struct SimilarityOutput {
    cosine: f64,
}

/// Reference cleanup via external program: `<program> <args..> <raw> <output_dir>`
pub struct CommandCleaner {
    spec: CommandSpec,
}

impl CommandCleaner {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl AudioCleaner for CommandCleaner {
    fn name(&self) -> &str {
        "audio cleanup"
    }

    async fn clean(
        &self,
        raw_audio: &Path,
        output_dir: &Path,
    ) -> Result<CleanupOutcome, CollaboratorError> {
        let output: CleanerOutput = run_json(
            self.name(),
            &self.spec,
            &[raw_audio.as_os_str().to_owned(), output_dir.as_os_str().to_owned()],
        )
        .await?;
        output.into_outcome(self.name())
    }
}

/// Speech recognition via external program: `<program> <args..> <audio>`
pub struct CommandTranscriber {
    spec: CommandSpec,
}

impl CommandTranscriber {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    fn name(&self) -> &str {
        "transcription"
    }

    async fn transcribe(&self, audio: &Path) -> Result<String, CollaboratorError> {
        let output: TranscriberOutput =
            run_json(self.name(), &self.spec, &[audio.as_os_str().to_owned()]).await?;
        Ok(output.text)
    }
}

/// Speaker similarity via external program: `<program> <args..> <reference> <candidate>`
pub struct CommandSimilarity {
    spec: CommandSpec,
}

impl CommandSimilarity {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl SpeakerSimilarity for CommandSimilarity {
    fn name(&self) -> &str {
        "speaker similarity"
    }

    async fn similarity(
        &self,
        reference: &Path,
        candidate: &Path,
    ) -> Result<f64, CollaboratorError> {
        let output: SimilarityOutput = run_json(
            self.name(),
            &self.spec,
            &[reference.as_os_str().to_owned(), candidate.as_os_str().to_owned()],
        )
        .await?;
        Ok(output.cosine)
    }
}
