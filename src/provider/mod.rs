//! Synthesis providers.
//!
//! A provider turns prepared speech text into either an encoded audio asset
//! (Piper, HTTP) or immediate on-device speech with no asset (system). Every
//! call receives a cancellation token and must return promptly once it is
//! cancelled.

use crate::cancellation::CancellationToken;
use crate::config::{NarrationConfig, ProviderKind};
use anyhow::{Context, Result};
use hound::WavSpec;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;
use tracing::info;

mod fallback;
mod http;
#[cfg(feature = "piper")]
mod piper;
mod system;

pub use fallback::FallbackProvider;
pub use http::HttpProvider;
#[cfg(feature = "piper")]
pub use piper::PiperProvider;
pub use system::SystemProvider;

/// Encoded audio ready for playback or caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioAsset {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl AudioAsset {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn wav(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "audio/wav")
    }

    /// File extension used when the asset is written to disk.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/ogg" | "audio/opus" => "ogg",
            "audio/flac" => "flac",
            "audio/aac" => "aac",
            _ => "bin",
        }
    }
}

/// Word or sentence timing reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentMark {
    pub time_ms: u64,
    pub text_offset: usize,
    pub length: usize,
}

/// Voice selection passed through verbatim to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    pub provider_id: String,
    pub voice_id: String,
    pub rate: f32,
}

impl VoiceSettings {
    pub fn from_config(config: &NarrationConfig) -> Self {
        Self {
            provider_id: config.provider.id().to_string(),
            voice_id: config.voice.clone(),
            rate: config.rate,
        }
    }
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self::from_config(&NarrationConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOutput {
    pub audio: Option<AudioAsset>,
    /// The provider already spoke the text on-device.
    pub is_native: bool,
    pub alignment: Option<Vec<AlignmentMark>>,
}

impl SynthesisOutput {
    pub fn asset(audio: AudioAsset) -> Self {
        Self {
            audio: Some(audio),
            is_native: false,
            alignment: None,
        }
    }

    pub fn native() -> Self {
        Self {
            audio: None,
            is_native: true,
            alignment: None,
        }
    }
}

pub trait SynthesisProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Synthesize `text`. Implementations check `cancel` before starting
    /// and after every blocking step, returning a cancellation error once
    /// it is set.
    fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSettings,
        cancel: &CancellationToken,
    ) -> Result<SynthesisOutput>;
}

/// Construct the provider selected in `config`.
pub fn build_provider(config: &NarrationConfig) -> Result<Arc<dyn SynthesisProvider>> {
    info!(provider = %config.provider, voice = %config.voice, "Building synthesis provider");
    let system = || Arc::new(SystemProvider::new(config.system_command.clone()));
    let primary: Arc<dyn SynthesisProvider> = match config.provider {
        ProviderKind::System => return Ok(system()),
        ProviderKind::Http => Arc::new(HttpProvider::from_config(config)?),
        ProviderKind::Piper => build_piper(config)?,
    };
    if !config.fallback_to_system {
        return Ok(primary);
    }
    info!(command = %config.system_command, "System speech is the fallback provider");
    Ok(Arc::new(FallbackProvider::new(primary, system())))
}

#[cfg(feature = "piper")]
fn build_piper(config: &NarrationConfig) -> Result<Arc<dyn SynthesisProvider>> {
    let provider = PiperProvider::new(
        config.piper_model_path.clone().into(),
        config.piper_espeak_path.clone().into(),
    )?;
    Ok(Arc::new(provider))
}

#[cfg(not(feature = "piper"))]
fn build_piper(_config: &NarrationConfig) -> Result<Arc<dyn SynthesisProvider>> {
    anyhow::bail!("the piper provider requires building with the `piper` feature")
}

/// Encode float samples as a 16-bit PCM WAV file in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).context("Creating WAV writer")?;
        for &s in samples {
            let clamped = (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            writer.write_sample(clamped)?;
        }
        writer.finalize().context("Finalizing WAV")?;
    }
    Ok(cursor.into_inner())
}
