//! Content-addressed synthesis cache
//!
//! Entries live in one shared directory as `<sha256 hex>.<ext>`. An entry is
//! created by the first successful synthesis for a key and only read after
//! that. No eviction. Within one process, synthesis of a key is
//! single-flight: concurrent identical jobs wait on [`SynthesisCache::claim`]
//! and then find the entry written by the first.

use crate::models::VoiceSettings;
use crate::text::normalize_whitespace;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use vcp_common::fs::write_atomic;
use vcp_common::Result;

/// Cache key: digest over the canonical synthesis inputs plus file extension
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub digest: String,
    pub extension: String,
}

impl CacheKey {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.digest, self.extension)
    }
}

/// File extension for a provider output format (`mp3_44100_128` -> `mp3`)
pub fn extension_for_format(output_format: &str) -> String {
    let prefix = output_format
        .split('_')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        "bin".to_string()
    } else {
        prefix
    }
}

/// Compute the cache key for one synthesis request
///
/// Fields are hashed in sorted-name order; text is whitespace-normalized
/// first so formatting differences share an entry.
pub fn cache_key(voice_id: &str, text: &str, settings: &VoiceSettings) -> CacheKey {
    let fields: BTreeMap<&str, Value> = BTreeMap::from([
        ("voice_id", json!(voice_id)),
        ("text", json!(normalize_whitespace(text))),
        ("stability", json!(settings.stability)),
        ("similarity_boost", json!(settings.similarity_boost)),
        ("style", json!(settings.style)),
        ("speed", json!(settings.speed)),
        ("model_id", json!(settings.model_id)),
        ("output_format", json!(settings.output_format)),
    ]);

    let mut hasher = Sha256::new();
    for (name, value) in &fields {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.to_string().as_bytes());
        hasher.update(b"\n");
    }

    CacheKey {
        digest: format!("{:x}", hasher.finalize()),
        extension: extension_for_format(&settings.output_format),
    }
}

/// Shared on-disk synthesis cache
#[derive(Debug, Clone)]
pub struct SynthesisCache {
    dir: PathBuf,
    in_flight: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SynthesisCache {
    /// Open (creating if needed) the cache directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Exclusive right to look up, synthesize and store `key`
    ///
    /// Hold the guard from lookup until the entry is stored.
    pub async fn claim(&self, key: &CacheKey) -> OwnedMutexGuard<()> {
        let slot = {
            let mut in_flight = self.in_flight.lock().await;
            // Slots referenced only by the map are idle
            in_flight.retain(|_, slot| Arc::strong_count(slot) > 1);
            in_flight.entry(key.digest.clone()).or_default().clone()
        };
        slot.lock_owned().await
    }

    pub fn key(&self, voice_id: &str, text: &str, settings: &VoiceSettings) -> CacheKey {
        cache_key(voice_id, text, settings)
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Cached audio path, if a non-empty entry exists
    pub async fn lookup(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.path_for(key);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                debug!(key = %key.digest, "Synthesis cache hit");
                Some(path)
            }
            _ => None,
        }
    }

    /// Store audio bytes under `key` (atomic, last writer wins)
    pub async fn store(&self, key: &CacheKey, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(key);
        write_atomic(&path, bytes).await?;
        debug!(key = %key.digest, bytes = bytes.len(), "Stored synthesis cache entry");
        Ok(path)
    }
}
