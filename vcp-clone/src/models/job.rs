//! Clone job record and state machine
//!
//! QUEUED → VALIDATING → [INGESTING] → SYNTHESIZING → VERIFYING → COMPLETED | FAILED
//!
//! The only backwards edge is VERIFYING → SYNTHESIZING, used by the single
//! automatic QC retry. Terminal jobs never change again.

use crate::models::{JobPayload, JobResult, QcReport, SynthesisResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;
use vcp_common::Error;

/// Opaque job identifier, rendered as 32 lowercase hex characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("Invalid job id {:?}: {}", s, e)))
    }
}

impl TryFrom<String> for JobId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.to_string()
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Record created, waiting for an execution slot
    Queued,
    /// Policy guard and optional planner
    Validating,
    /// Reference audio cleanup
    Ingesting,
    /// TTS call (or cache hit)
    Synthesizing,
    /// ASR + speaker similarity scoring
    Verifying,
    /// Final audio accepted
    Completed,
    /// Terminal failure (admission, input, provider, quality or orchestration)
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Validating => 1,
            JobStatus::Ingesting => 2,
            JobStatus::Synthesizing => 3,
            JobStatus::Verifying => 4,
            JobStatus::Completed | JobStatus::Failed => 5,
        }
    }

    /// Whether the state machine permits moving from `self` to `next`
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStatus::Failed => true,
            JobStatus::Completed => self == JobStatus::Verifying,
            JobStatus::Synthesizing if self == JobStatus::Verifying => true,
            _ => next.rank() >= self.rank(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Validating => "validating",
            JobStatus::Ingesting => "ingesting",
            JobStatus::Synthesizing => "synthesizing",
            JobStatus::Verifying => "verifying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage tag attached to events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Policy,
    Planner,
    Ingestion,
    Synthesis,
    Qc,
    Orchestrator,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Policy => "policy",
            Stage::Planner => "planner",
            Stage::Ingestion => "ingestion",
            Stage::Synthesis => "synthesis",
            Stage::Qc => "qc",
            Stage::Orchestrator => "orchestrator",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable event log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub time: DateTime<Utc>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JobEvent {
    pub fn new(
        message: impl Into<String>,
        stage: Option<Stage>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            time: Utc::now(),
            message: message.into(),
            stage,
            data,
        }
    }
}

/// Intermediate artifacts accumulated while the job runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobArtifacts {
    /// Cleaned single-speaker reference (ingest output)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean_reference_path: Option<PathBuf>,
    /// Every synthesis attempt, in order
    #[serde(default)]
    pub synthesis_attempts: Vec<SynthesisResult>,
}

/// Persisted clone job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payload: JobPayload,
    #[serde(default)]
    pub artifacts: JobArtifacts,
    #[serde(default)]
    pub events: Vec<JobEvent>,
    #[serde(default)]
    pub error: Option<String>,
    /// Latest QC report (present on QC pass and QC failure)
    #[serde(default)]
    pub qc: Option<QcReport>,
    #[serde(default)]
    pub result: Option<JobResult>,
}

/// Partial update merged into a job by the store
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub error: Option<String>,
    pub qc: Option<QcReport>,
    pub result: Option<JobResult>,
    pub clean_reference_path: Option<PathBuf>,
    /// Appended to `artifacts.synthesis_attempts`
    pub synthesis_attempt: Option<SynthesisResult>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn completed(result: JobResult) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            qc: Some(result.qc.clone()),
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn with_qc(mut self, report: QcReport) -> Self {
        self.qc = Some(report);
        self
    }
}

/// Lightweight listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub status: JobStatus,
    pub voice_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl Job {
    /// Create new queued job
    pub fn new(payload: JobPayload) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            payload,
            artifacts: JobArtifacts::default(),
            events: Vec::new(),
            error: None,
            qc: None,
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge a partial update, enforcing the state machine
    ///
    /// Status changes are recorded in the event log. Nothing is modified when
    /// the update is rejected.
    pub fn apply(&mut self, update: JobUpdate) -> Result<(), Error> {
        if self.is_terminal() {
            return Err(Error::InvalidTransition(format!(
                "job {} is already {}",
                self.id, self.status
            )));
        }

        if let Some(next) = update.status {
            if !self.status.can_transition_to(next) {
                return Err(Error::InvalidTransition(format!(
                    "job {}: {} -> {} is not allowed",
                    self.id, self.status, next
                )));
            }
            if next != self.status {
                self.events.push(JobEvent::new(
                    format!("Status changed to {}", next),
                    None,
                    Some(serde_json::json!({ "from": self.status, "to": next })),
                ));
                self.status = next;
            }
        }

        if let Some(error) = update.error {
            self.error = Some(error);
        }
        if let Some(report) = update.qc {
            self.qc = Some(report);
        }
        if let Some(result) = update.result {
            self.result = Some(result);
        }
        if let Some(path) = update.clean_reference_path {
            self.artifacts.clean_reference_path = Some(path);
        }
        if let Some(attempt) = update.synthesis_attempt {
            self.artifacts.synthesis_attempts.push(attempt);
        }

        self.updated_at = Utc::now();
        Ok(())
    }

    /// Statuses visited so far, reconstructed from the event log
    pub fn status_history(&self) -> Vec<JobStatus> {
        let mut history = vec![JobStatus::Queued];
        history.extend(self.events.iter().filter_map(|event| {
            event
                .data
                .as_ref()
                .filter(|_| event.stage.is_none())
                .and_then(|data| data.get("to"))
                .and_then(|to| serde_json::from_value::<JobStatus>(to.clone()).ok())
        }));
        history
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            status: self.status,
            voice_id: self.payload.voice_id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobPayload;

    fn test_job() -> Job {
        Job::new(JobPayload::for_tests("V1", "Hello world"))
    }

    #[test]
    fn job_id_renders_as_hex_and_parses_both_forms() {
        let id = JobId::new();
        let hex = id.to_string();
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));

        assert_eq!(hex.parse::<JobId>().unwrap(), id);
        let hyphenated = id.0.hyphenated().to_string();
        assert_eq!(hyphenated.parse::<JobId>().unwrap(), id);
        assert!("not-an-id".parse::<JobId>().is_err());
    }

    #[test]
    fn job_id_serializes_as_string() {
        let id = JobId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
        let back: JobId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn forward_transitions_are_allowed() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Validating));
        assert!(Validating.can_transition_to(Ingesting));
        assert!(Validating.can_transition_to(Synthesizing));
        assert!(Ingesting.can_transition_to(Synthesizing));
        assert!(Synthesizing.can_transition_to(Verifying));
        assert!(Verifying.can_transition_to(Completed));
        assert!(Queued.can_transition_to(Failed));
    }

    #[test]
    fn retry_edge_is_the_only_backwards_edge() {
        use JobStatus::*;
        assert!(Verifying.can_transition_to(Synthesizing));
        assert!(!Synthesizing.can_transition_to(Validating));
        assert!(!Verifying.can_transition_to(Ingesting));
        assert!(!Synthesizing.can_transition_to(Completed));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        use JobStatus::*;
        for next in [Queued, Validating, Synthesizing, Verifying, Completed, Failed] {
            assert!(!Completed.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn apply_records_status_changes_in_history() {
        let mut job = test_job();
        job.apply(JobUpdate::status(JobStatus::Validating)).unwrap();
        job.apply(JobUpdate::status(JobStatus::Synthesizing)).unwrap();
        job.apply(JobUpdate::failed("tts generation failed")).unwrap();

        assert_eq!(
            job.status_history(),
            vec![
                JobStatus::Queued,
                JobStatus::Validating,
                JobStatus::Synthesizing,
                JobStatus::Failed
            ]
        );
        assert_eq!(job.error.as_deref(), Some("tts generation failed"));
    }

    #[test]
    fn rejected_update_leaves_job_untouched() {
        let mut job = test_job();
        job.apply(JobUpdate::status(JobStatus::Verifying)).unwrap();
        let before = job.clone();

        let err = job.apply(JobUpdate::status(JobStatus::Validating)).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
        assert_eq!(job, before);
    }

    #[test]
    fn terminal_job_is_immutable() {
        let mut job = test_job();
        job.apply(JobUpdate::failed("missing consent")).unwrap();

        let err = job
            .apply(JobUpdate {
                error: Some("overwrite".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
        assert_eq!(job.error.as_deref(), Some("missing consent"));
    }
}
