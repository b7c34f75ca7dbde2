//! Synthesized-audio cache.
//!
//! Entries are keyed by the normalized speech text plus the voice settings
//! that produced them. The file cache stores each asset as
//! `tts-{sha256}.{ext}` next to a JSON sidecar carrying the mime type and
//! alignment; the sidecar is written last so its presence marks a complete
//! entry.

use crate::config::NarrationConfig;
use crate::normalizer::normalized_key_text;
use crate::provider::{AlignmentMark, AudioAsset, VoiceSettings};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct CacheKey {
    pub normalized_text: String,
    pub provider_id: String,
    pub voice_id: String,
    pub rate: f32,
}

impl CacheKey {
    pub fn new(text: &str, voice: &VoiceSettings) -> Self {
        Self {
            normalized_text: normalized_key_text(text),
            provider_id: voice.provider_id.clone(),
            voice_id: voice.voice_id.clone(),
            rate: voice.rate,
        }
    }

    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.provider_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.voice_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.normalized_text.as_bytes());
        hasher.update(self.rate.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedSegment {
    pub audio: AudioAsset,
    pub alignment: Option<Vec<AlignmentMark>>,
}

pub trait SegmentCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedSegment>>;
    fn put(&self, key: &CacheKey, segment: &CachedSegment) -> Result<()>;
}

/// Cache selected by `cache.enabled` / `cache.dir`.
pub fn build_cache(config: &NarrationConfig) -> Arc<dyn SegmentCache> {
    if config.cache_enabled {
        info!(dir = %config.cache_dir, "Using file segment cache");
        Arc::new(FileSegmentCache::new(&config.cache_dir))
    } else {
        info!("Segment cache disabled");
        Arc::new(DisabledCache)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    mime_type: String,
    audio_file: String,
    #[serde(default)]
    alignment: Option<Vec<AlignmentMark>>,
}

#[derive(Debug, Clone)]
pub struct FileSegmentCache {
    root: PathBuf,
}

impl FileSegmentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sidecar_path(&self, digest: &str) -> PathBuf {
        self.root.join(format!("tts-{digest}.json"))
    }
}

impl SegmentCache for FileSegmentCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedSegment>> {
        let digest = key.digest();
        let sidecar_path = self.sidecar_path(&digest);
        let Ok(contents) = fs::read_to_string(&sidecar_path) else {
            return Ok(None);
        };
        let sidecar: Sidecar = match serde_json::from_str(&contents) {
            Ok(sidecar) => sidecar,
            Err(err) => {
                warn!(path = %sidecar_path.display(), "Ignoring corrupt cache sidecar: {err}");
                return Ok(None);
            }
        };
        let audio_path = self.root.join(&sidecar.audio_file);
        let bytes = match fs::read(&audio_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %audio_path.display(), "Cache sidecar without audio: {err}");
                return Ok(None);
            }
        };
        debug!(path = %audio_path.display(), "Segment cache hit");
        Ok(Some(CachedSegment {
            audio: AudioAsset::new(bytes, sidecar.mime_type),
            alignment: sidecar.alignment,
        }))
    }

    fn put(&self, key: &CacheKey, segment: &CachedSegment) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Creating cache dir {}", self.root.display()))?;
        let digest = key.digest();
        let audio_file = format!("tts-{digest}.{}", segment.audio.extension());
        write_atomic(&self.root.join(&audio_file), &segment.audio.bytes)?;

        let sidecar = Sidecar {
            mime_type: segment.audio.mime_type.clone(),
            audio_file,
            alignment: segment.alignment.clone(),
        };
        let json = serde_json::to_vec(&sidecar).context("Serializing cache sidecar")?;
        let sidecar_path = self.sidecar_path(&digest);
        write_atomic(&sidecar_path, &json)?;
        debug!(path = %sidecar_path.display(), "Stored segment in cache");
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = unique_temp_path(path);
    fs::write(&temp_path, bytes)
        .with_context(|| format!("Writing {}", temp_path.display()))?;
    if fs::rename(&temp_path, path).is_err() {
        fs::copy(&temp_path, path).with_context(|| format!("Writing {}", path.display()))?;
        let _ = fs::remove_file(&temp_path);
    }
    Ok(())
}

fn unique_temp_path(path: &Path) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let nonce = SEQ.fetch_add(1, Ordering::Relaxed);
    let ts_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut temp_name = path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("tts.bin")
        .to_string();
    temp_name.push_str(&format!(".tmp-{ts_nanos}-{nonce}"));
    path.with_file_name(temp_name)
}

/// In-process cache; entries live as long as the cache.
#[derive(Debug, Default)]
pub struct MemorySegmentCache {
    entries: Mutex<HashMap<String, CachedSegment>>,
}

impl MemorySegmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SegmentCache for MemorySegmentCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedSegment>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&key.digest()).cloned())
    }

    fn put(&self, key: &CacheKey, segment: &CachedSegment) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.digest(), segment.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCache;

impl SegmentCache for DisabledCache {
    fn get(&self, _key: &CacheKey) -> Result<Option<CachedSegment>> {
        Ok(None)
    }

    fn put(&self, _key: &CacheKey, _segment: &CachedSegment) -> Result<()> {
        Ok(())
    }
}
