//! On-device neural synthesis with `piper-rs`.

use super::{AudioAsset, SynthesisOutput, SynthesisProvider, VoiceSettings, encode_wav};
use crate::cancellation::CancellationToken;
use anyhow::{Context, Result};
use piper_rs::from_config_path;
use piper_rs::synth::{AudioOutputConfig, PiperSpeechSynthesizer};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

pub struct PiperProvider {
    model_path: PathBuf,
    synthesizer: Mutex<PiperSpeechSynthesizer>,
}

impl PiperProvider {
    pub fn new(model_path: PathBuf, espeak_path: PathBuf) -> Result<Self> {
        let espeak_path = sanitize_espeak_root(espeak_path);
        if env::var_os("PIPER_ESPEAKNG_DATA_DIRECTORY").is_none() {
            // Set once during provider construction, before any synthesis thread runs.
            unsafe {
                env::set_var("PIPER_ESPEAKNG_DATA_DIRECTORY", &espeak_path);
            }
        }
        let config_path = resolve_piper_config(&model_path);
        if !config_path.exists() {
            anyhow::bail!(
                "Piper config not found at {} (expected from {})",
                config_path.display(),
                model_path.display()
            );
        }
        info!(
            model = %model_path.display(),
            espeak_root = %espeak_path.display(),
            "Loading Piper voice"
        );
        let model = from_config_path(&config_path).context("Loading Piper model")?;
        let synthesizer =
            PiperSpeechSynthesizer::new(model).context("Preparing Piper synthesizer")?;
        Ok(Self {
            model_path,
            synthesizer: Mutex::new(synthesizer),
        })
    }
}

impl SynthesisProvider for PiperProvider {
    fn id(&self) -> &str {
        "piper"
    }

    fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSettings,
        cancel: &CancellationToken,
    ) -> Result<SynthesisOutput> {
        cancel.check_cancelled("piper:start")?;
        debug!(
            model = %self.model_path.display(),
            rate = voice.rate,
            chars = text.len(),
            "Synthesizing sentence with Piper"
        );
        let output_config = if (voice.rate - 1.0).abs() <= f32::EPSILON {
            None
        } else {
            Some(AudioOutputConfig {
                rate: Some(speed_to_rate_percent(voice.rate)),
                volume: None,
                pitch: None,
                appended_silence_ms: None,
            })
        };

        let mut samples: Vec<f32> = Vec::new();
        let mut sample_rate: Option<u32> = None;
        let mut channels: Option<u16> = None;
        let synthesizer = self.synthesizer.lock().unwrap_or_else(PoisonError::into_inner);
        for chunk in synthesizer.synthesize_lazy(text.to_string(), output_config)? {
            cancel.check_cancelled("piper:chunk")?;
            let chunk = chunk?;
            if sample_rate.is_none() {
                sample_rate = Some(chunk.info.sample_rate as u32);
                channels = Some(chunk.info.num_channels as u16);
            }
            samples.extend_from_slice(chunk.samples.as_slice());
        }
        drop(synthesizer);
        cancel.check_cancelled("piper:encode")?;

        if samples.is_empty() {
            anyhow::bail!("No speech data produced");
        }
        let bytes = encode_wav(
            &samples,
            sample_rate.unwrap_or(22050),
            channels.unwrap_or(1),
        )?;
        Ok(SynthesisOutput::asset(AudioAsset::wav(bytes)))
    }
}

/// Piper expects the parent directory that contains `espeak-ng-data/phonindex`.
/// Users often point directly at `.../espeak-ng-data`; trim that suffix.
fn sanitize_espeak_root(path: PathBuf) -> PathBuf {
    if path
        .file_name()
        .map(|n| n == "espeak-ng-data")
        .unwrap_or(false)
    {
        if let Some(parent) = path.parent() {
            debug!(
                original = %path.display(),
                sanitized = %parent.display(),
                "Trimming espeak-ng-data suffix"
            );
            return parent.to_path_buf();
        }
    }
    path
}

fn resolve_piper_config(model_path: &Path) -> PathBuf {
    if model_path
        .extension()
        .map(|ext| ext == "onnx")
        .unwrap_or(false)
    {
        return model_path.with_extension("onnx.json");
    }
    model_path.to_path_buf()
}

fn speed_to_rate_percent(speed: f32) -> u8 {
    let clamped = speed.clamp(0.5, 5.5);
    let percent = ((clamped - 0.5) / 5.0) * 100.0;
    percent.round().clamp(0.0, 100.0) as u8
}
