//! Test Helper Utilities
//!
//! Shared utilities for testing vcp-clone: scripted collaborator fakes and a
//! temporary pipeline environment.

#![allow(dead_code)]

pub mod fakes;

pub use fakes::{FakeCleaner, FakePlanner, FakeSimilarity, FakeTranscriber, FakeTts, TtsMode};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vcp_clone::collaborators::Collaborators;
use vcp_clone::config::PipelineSettings;
use vcp_clone::models::{CloneRequest, Job, JobId, JobStatus};
use vcp_clone::Pipeline;
use vcp_common::config::RootFolderLayout;

/// Upper bound for any single job in these tests
pub const JOB_DEADLINE: Duration = Duration::from_secs(10);

/// Temporary root folder plus scripted collaborators
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub layout: RootFolderLayout,
    pub settings: PipelineSettings,
    pub tts: Arc<FakeTts>,
    pub cleaner: Arc<FakeCleaner>,
    pub transcriber: Arc<FakeTranscriber>,
    pub similarity: Arc<FakeSimilarity>,
}

impl TestEnv {
    /// Environment whose transcriber echoes `transcript` and whose scorer returns 0.9
    pub fn new(transcript: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let layout = RootFolderLayout::new(temp_dir.path().join("root"));

        let mut settings = PipelineSettings::default();
        settings.timeouts.preprocess = Duration::from_secs(5);
        settings.timeouts.synthesis = Duration::from_secs(5);
        settings.timeouts.transcription = Duration::from_secs(5);
        settings.timeouts.similarity = Duration::from_secs(5);
        settings.timeouts.planner = Duration::from_secs(5);

        Self {
            temp_dir,
            layout,
            settings,
            tts: Arc::new(FakeTts::new()),
            cleaner: Arc::new(FakeCleaner::clean()),
            transcriber: Arc::new(FakeTranscriber::new(transcript)),
            similarity: Arc::new(FakeSimilarity::new(0.9)),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            cleaner: self.cleaner.clone(),
            tts: self.tts.clone(),
            transcriber: self.transcriber.clone(),
            similarity: self.similarity.clone(),
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(&self.layout, self.settings.clone(), self.collaborators()).unwrap()
    }

    /// Write a stand-in raw reference recording and return its absolute path
    pub fn raw_audio(&self) -> PathBuf {
        let path = self.temp_dir.path().join("take1.wav");
        std::fs::write(&path, b"RIFF....WAVEfmt ").unwrap();
        path
    }
}

/// A request that passes the policy guard
pub fn valid_request(voice_id: &str, text: &str) -> CloneRequest {
    CloneRequest {
        provider: Some("elevenlabs".to_string()),
        consent_flag: true,
        ..CloneRequest::new(voice_id, text)
    }
}

/// Submit and wait for the terminal record
pub async fn run_to_end(pipeline: &Pipeline, request: CloneRequest) -> Job {
    let submitted = pipeline.submit(request).await.unwrap();
    assert_eq!(submitted.status, JobStatus::Queued);
    wait_for(pipeline, submitted.id).await
}

pub async fn wait_for(pipeline: &Pipeline, id: JobId) -> Job {
    tokio::time::timeout(JOB_DEADLINE, pipeline.wait_for_terminal(id))
        .await
        .expect("job did not finish in time")
        .unwrap()
}

/// Poll until the job reaches `status`
pub async fn wait_for_status(pipeline: &Pipeline, id: JobId, status: JobStatus) {
    tokio::time::timeout(JOB_DEADLINE, async {
        loop {
            let job = pipeline.get(id).await.unwrap().unwrap();
            if job.status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job never reached expected status");
}

/// Messages of all events tagged with `stage`
pub fn stage_messages(job: &Job, stage: vcp_clone::models::Stage) -> Vec<String> {
    job.events
        .iter()
        .filter(|e| e.stage == Some(stage))
        .map(|e| e.message.clone())
        .collect()
}
