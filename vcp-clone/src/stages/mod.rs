//! Pipeline stages
//!
//! Each stage moves the job to its status, records events through the job
//! store, and returns the next artifact or a terminal [`StageError`].
//!
//! [`StageError`]: crate::error::StageError

pub mod ingest;
pub mod synthesize;
pub mod verify;

use crate::cache::SynthesisCache;
use crate::collaborators::Collaborators;
use crate::config::PipelineSettings;
use crate::error::CollaboratorError;
use crate::store::JobStore;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

/// Shared, constructor-injected state for every stage
pub struct StageContext {
    pub store: JobStore,
    pub cache: SynthesisCache,
    pub collaborators: Collaborators,
    pub settings: PipelineSettings,
    /// Per-job scratch directories live beneath this
    pub work_dir: PathBuf,
}

/// Run a collaborator call under `limit`
pub(crate) async fn call_with_timeout<T, F>(
    name: &str,
    limit: Duration,
    call: F,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::TimedOut {
            name: name.to_string(),
            seconds: limit.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_call_times_out() {
        let result: Result<(), _> = call_with_timeout("tts", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(CollaboratorError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let result = call_with_timeout("asr", Duration::from_secs(1), async {
            Ok::<_, CollaboratorError>("hello".to_string())
        })
        .await;
        assert_eq!(result.unwrap(), "hello");
    }
}
