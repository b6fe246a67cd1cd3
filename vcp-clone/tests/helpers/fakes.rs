//! Scripted collaborator fakes

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use vcp_clone::collaborators::{
    AudioCleaner, CleanupOutcome, SpeakerSimilarity, Transcriber, TtsProvider, TtsRequest,
};
use vcp_clone::planner::{PlanAction, PlanContext, Planner};
use vcp_clone::CollaboratorError;

#[derive(Debug, Clone, PartialEq)]
pub enum TtsMode {
    /// Return `AUDIO[<text>]`
    Audio,
    /// Return zero bytes
    Empty,
    /// Return a request error
    Fail,
    Panic,
    /// Sleep before answering
    Slow(Duration),
}

/// TTS fake that records every request
pub struct FakeTts {
    mode: Mutex<TtsMode>,
    calls: AtomicUsize,
    requests: Mutex<Vec<TtsRequest>>,
}

impl FakeTts {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(TtsMode::Audio),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: TtsMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TtsRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TtsProvider for FakeTts {
    fn name(&self) -> &str {
        "fake tts"
    }

    async fn synthesize(&self, request: &TtsRequest) -> Result<Vec<u8>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let mode = self.mode.lock().unwrap().clone();

        match mode {
            TtsMode::Audio => Ok(format!("AUDIO[{}]", request.text).into_bytes()),
            TtsMode::Empty => Ok(Vec::new()),
            TtsMode::Fail => Err(CollaboratorError::request("fake tts", "HTTP 500")),
            TtsMode::Panic => panic!("tts adapter exploded"),
            TtsMode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(format!("AUDIO[{}]", request.text).into_bytes())
            }
        }
    }
}

/// Cleanup fake: either writes `clean.wav` into the output dir or refuses
pub struct FakeCleaner {
    refusal: Option<String>,
    calls: AtomicUsize,
}

impl FakeCleaner {
    pub fn clean() -> Self {
        Self {
            refusal: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unusable(reason: &str) -> Self {
        Self {
            refusal: Some(reason.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioCleaner for FakeCleaner {
    fn name(&self) -> &str {
        "fake cleaner"
    }

    async fn clean(
        &self,
        _raw_audio: &Path,
        output_dir: &Path,
    ) -> Result<CleanupOutcome, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.refusal {
            return Ok(CleanupOutcome::Unusable(reason.clone()));
        }
        let path = output_dir.join("clean.wav");
        tokio::fs::write(&path, b"clean mono")
            .await
            .map_err(|e| CollaboratorError::request("fake cleaner", e))?;
        Ok(CleanupOutcome::Clean(path))
    }
}

/// ASR fake: scripted answers first, then the default transcript
pub struct FakeTranscriber {
    script: Mutex<VecDeque<Result<String, String>>>,
    default: String,
}

impl FakeTranscriber {
    pub fn new(default: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: default.to_string(),
        }
    }

    pub fn push(&self, answer: Result<&str, &str>) {
        self.script
            .lock()
            .unwrap()
            .push_back(answer.map(str::to_string).map_err(str::to_string));
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    fn name(&self) -> &str {
        "fake asr"
    }

    async fn transcribe(&self, _audio: &Path) -> Result<String, CollaboratorError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(reason)) => Err(CollaboratorError::request("fake asr", reason)),
            None => Ok(self.default.clone()),
        }
    }
}

/// Speaker scorer fake: scripted answers first, then the default score
pub struct FakeSimilarity {
    script: Mutex<VecDeque<Result<f64, String>>>,
    default: f64,
    calls: AtomicUsize,
}

impl FakeSimilarity {
    pub fn new(default: f64) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, answer: Result<f64, &str>) {
        self.script
            .lock()
            .unwrap()
            .push_back(answer.map_err(str::to_string));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeakerSimilarity for FakeSimilarity {
    fn name(&self) -> &str {
        "fake scorer"
    }

    async fn similarity(
        &self,
        _reference: &Path,
        _candidate: &Path,
    ) -> Result<f64, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(score)) => Ok(score),
            Some(Err(reason)) => Err(CollaboratorError::request("fake scorer", reason)),
            None => Ok(self.default),
        }
    }
}

/// Planner fake returning fixed actions or a fixed failure
pub struct FakePlanner {
    answer: Result<Vec<PlanAction>, String>,
}

impl FakePlanner {
    pub fn actions(actions: Vec<PlanAction>) -> Self {
        Self {
            answer: Ok(actions),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            answer: Err(reason.to_string()),
        }
    }
}

#[async_trait]
impl Planner for FakePlanner {
    fn name(&self) -> &str {
        "fake planner"
    }

    async fn plan(&self, _context: &PlanContext) -> Result<Vec<PlanAction>, CollaboratorError> {
        self.answer
            .clone()
            .map_err(|reason| CollaboratorError::request("fake planner", reason))
    }
}
