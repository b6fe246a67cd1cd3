//! Error types for vcp-clone
//!
//! Every variant of [`StageError`] ends a job in `failed`; the text persisted
//! into `Job.error` comes from [`StageError::job_message`].

use crate::models::QcReport;
use thiserror::Error;

/// Admission decision made by the policy guard
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("missing consent")]
    MissingConsent,

    /// Provider other than ElevenLabs (carries what was requested)
    #[error("provider not ElevenLabs")]
    UnsupportedProvider(String),

    #[error("text too long ({len} > {max})")]
    TextTooLong { len: usize, max: usize },
}

/// Failure reported by an external collaborator adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// No adapter configured for this capability
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// Call failed (transport error, non-zero exit, non-2xx status)
    #[error("{name} request failed: {reason}")]
    Request { name: String, reason: String },

    /// Call succeeded but output could not be used
    #[error("{name} returned invalid output: {reason}")]
    InvalidOutput { name: String, reason: String },

    /// Call exceeded its stage timeout
    #[error("{name} timed out after {seconds}s")]
    TimedOut { name: String, seconds: u64 },
}

impl CollaboratorError {
    pub fn request(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Request {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_output(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidOutput {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Terminal stage failure
#[derive(Debug, Error)]
pub enum StageError {
    /// Admission refused by the policy guard
    #[error("rejected: {0}")]
    Rejected(#[from] PolicyViolation),

    /// Unusable input (e.g. reference audio cleanup failed)
    #[error("input error: {0}")]
    Input(String),

    /// TTS provider failure
    #[error("provider error: {0}")]
    Provider(String),

    /// QC gates failed after the single automatic retry
    #[error("quality gate failed: {reason}")]
    Quality {
        reason: String,
        report: Box<QcReport>,
    },

    /// Collaborator call exceeded its stage timeout
    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: &'static str, seconds: u64 },

    #[error("cancelled")]
    Cancelled,

    /// Unexpected fault (panic or bug) caught at a stage boundary
    #[error("orchestration error: {0}")]
    Orchestration(String),

    /// Job store failure while recording progress
    #[error("store error: {0}")]
    Store(#[from] vcp_common::Error),
}

impl StageError {
    /// Message persisted into the failed job record
    pub fn job_message(&self) -> String {
        match self {
            StageError::Rejected(violation) => violation.to_string(),
            StageError::Input(msg) | StageError::Provider(msg) => msg.clone(),
            StageError::Quality { reason, .. } => reason.clone(),
            StageError::Timeout { .. } | StageError::Cancelled => self.to_string(),
            StageError::Orchestration(detail) => format!("orchestration error: {}", detail),
            StageError::Store(err) => format!("orchestration error: {}", err),
        }
    }

    /// QC report attached to a quality failure
    pub fn qc_report(&self) -> Option<&QcReport> {
        match self {
            StageError::Quality { report, .. } => Some(report),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_messages_are_persisted_verbatim() {
        assert_eq!(
            StageError::from(PolicyViolation::MissingConsent).job_message(),
            "missing consent"
        );
        assert_eq!(
            StageError::from(PolicyViolation::UnsupportedProvider("openai".into())).job_message(),
            "provider not ElevenLabs"
        );
        assert_eq!(
            StageError::from(PolicyViolation::TextTooLong { len: 900, max: 800 }).job_message(),
            "text too long (900 > 800)"
        );
    }

    #[test]
    fn unexpected_faults_are_prefixed() {
        let err = StageError::Orchestration("stage panicked: boom".into());
        assert_eq!(err.job_message(), "orchestration error: stage panicked: boom");

        let err = StageError::from(vcp_common::Error::Internal("disk full".into()));
        assert!(err.job_message().starts_with("orchestration error: "));
    }

    #[test]
    fn timeout_and_cancel_messages() {
        let err = StageError::Timeout {
            stage: "synthesis",
            seconds: 120,
        };
        assert_eq!(err.job_message(), "synthesis timed out after 120s");
        assert_eq!(StageError::Cancelled.job_message(), "cancelled");
    }
}
