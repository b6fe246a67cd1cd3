//! QC decision engine
//!
//! Scores a synthesized take (WER against the script, speaker cosine against
//! the cleaned reference) and decides pass, retry, or fail. The verify stage
//! drives the loop; everything here is side-effect free except the
//! collaborator calls in [`scoring`].

pub mod decision;
pub mod metrics;
pub mod scoring;

pub use decision::{adjust_for_retry, evaluate_gates, GateVerdict, MAX_AUTOMATIC_RETRIES};
pub use metrics::word_error_rate;
pub use scoring::{score_take, ScoredTake};
