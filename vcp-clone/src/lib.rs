//! vcp-clone library
//!
//! Voice-clone job orchestration: admission policy, durable job records,
//! content-addressed TTS cache, and a QC decision engine that allows exactly
//! one automatic re-synthesis.

pub mod cache;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod planner;
pub mod policy;
pub mod qc;
pub mod stages;
pub mod store;
pub mod text;

pub use error::{CollaboratorError, PolicyViolation, StageError};
pub use pipeline::{Pipeline, SubmittedJob};
pub use store::JobStore;
