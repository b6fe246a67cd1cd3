//! Data models for vcp-clone
//!
//! - Job record, status state machine and event log
//! - Admission request and resolved payload
//! - Synthesis parameters and results
//! - QC metrics and reports

pub mod job;
pub mod payload;
pub mod qc;
pub mod synthesis;

pub use job::{Job, JobArtifacts, JobEvent, JobId, JobStatus, JobSummary, JobUpdate, Stage};
pub use payload::{
    AdmissionLimits, AdmissionLimitsOverride, CloneRequest, JobPayload, Mode, QcGates,
    QcGatesOverride, RetryCaps, RetryCapsOverride, VoiceDefaults, VoiceDefaultsOverride,
};
pub use qc::{JobResult, QcDecision, QcMetrics, QcReport};
pub use synthesis::{SynthesisResult, VoiceSettings};
