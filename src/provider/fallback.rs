//! Falls back to on-device speech when the configured provider fails.

use super::{SynthesisOutput, SynthesisProvider, VoiceSettings};
use crate::cancellation::{CancellationToken, is_cancellation};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

pub struct FallbackProvider {
    primary: Arc<dyn SynthesisProvider>,
    fallback: Arc<dyn SynthesisProvider>,
}

impl FallbackProvider {
    pub fn new(primary: Arc<dyn SynthesisProvider>, fallback: Arc<dyn SynthesisProvider>) -> Self {
        Self { primary, fallback }
    }

    /// The fallback speaks with its own default voice; voice ids of the
    /// primary provider mean nothing to it.
    fn fallback_voice(&self, voice: &VoiceSettings) -> VoiceSettings {
        VoiceSettings {
            provider_id: self.fallback.id().to_string(),
            voice_id: String::new(),
            rate: voice.rate,
        }
    }
}

impl SynthesisProvider for FallbackProvider {
    fn id(&self) -> &str {
        self.primary.id()
    }

    fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSettings,
        cancel: &CancellationToken,
    ) -> Result<SynthesisOutput> {
        let err = match self.primary.synthesize(text, voice, cancel) {
            Ok(output) => return Ok(output),
            Err(err) if is_cancellation(&err) => return Err(err),
            Err(err) => err,
        };
        warn!(
            primary = self.primary.id(),
            fallback = self.fallback.id(),
            "Falling back to {} after provider error: {err:#}",
            self.fallback.id()
        );
        cancel.check_cancelled("fallback:start")?;
        self.fallback
            .synthesize(text, &self.fallback_voice(voice), cancel)
            .with_context(|| format!("{} failed after: {err:#}", self.fallback.id()))
    }
}
