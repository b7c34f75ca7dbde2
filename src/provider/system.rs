//! Native speech through a local command (`espeak-ng` by default).
//!
//! The command speaks immediately, so there is no asset to return or cache.

use super::{SynthesisOutput, SynthesisProvider, VoiceSettings};
use crate::cancellation::CancellationToken;
use anyhow::{Context, Result, bail};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const BASE_WORDS_PER_MINUTE: f32 = 175.0;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct SystemProvider {
    command: String,
}

impl SystemProvider {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn build_command(&self, text: &str, voice: &VoiceSettings) -> Command {
        let mut command = Command::new(&self.command);
        if !voice.voice_id.trim().is_empty() {
            command.arg("-v").arg(voice.voice_id.trim());
        }
        command
            .arg("-s")
            .arg(words_per_minute(voice.rate).to_string())
            .arg("--")
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        command
    }
}

impl SynthesisProvider for SystemProvider {
    fn id(&self) -> &str {
        "system"
    }

    fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSettings,
        cancel: &CancellationToken,
    ) -> Result<SynthesisOutput> {
        cancel.check_cancelled("system:start")?;
        debug!(command = %self.command, voice = %voice.voice_id, chars = text.len(), "Speaking natively");
        let mut child = self
            .build_command(text, voice)
            .spawn()
            .with_context(|| format!("Spawning speech command `{}`", self.command))?;

        loop {
            if cancel.is_cancelled() {
                if let Err(err) = child.kill() {
                    warn!("Failed to stop speech command: {err}");
                }
                let _ = child.wait();
                cancel.check_cancelled("system:speaking")?;
            }
            match child.try_wait().context("Polling speech command")? {
                Some(status) if status.success() => return Ok(SynthesisOutput::native()),
                Some(status) => {
                    let output = child.wait_with_output().ok();
                    let stderr = output
                        .map(|out| String::from_utf8_lossy(&out.stderr).trim().to_string())
                        .unwrap_or_default();
                    bail!("speech command exited with {status}: {stderr}");
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        }
    }
}

fn words_per_minute(rate: f32) -> u32 {
    (BASE_WORDS_PER_MINUTE * rate).round().clamp(80.0, 450.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::is_cancellation;

    #[test]
    fn rate_scales_words_per_minute() {
        assert_eq!(words_per_minute(1.0), 175);
        assert_eq!(words_per_minute(2.0), 350);
        assert_eq!(words_per_minute(0.1), 80);
        assert_eq!(words_per_minute(10.0), 450);
    }

    #[test]
    fn command_carries_voice_and_text() {
        let provider = SystemProvider::new("espeak-ng");
        let voice = VoiceSettings {
            provider_id: "system".to_string(),
            voice_id: "en-gb".to_string(),
            rate: 1.0,
        };
        let command = provider.build_command("Hello there.", &voice);
        let args: Vec<String> = command
            .get_args()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();
        assert_eq!(args, vec!["-v", "en-gb", "-s", "175", "--", "Hello there."]);
    }

    #[test]
    fn missing_command_is_an_error() {
        let provider = SystemProvider::new("reader-narrator-no-such-command");
        let err = provider
            .synthesize("Hi.", &VoiceSettings::default(), &CancellationToken::new())
            .expect_err("spawn fails");
        assert!(!is_cancellation(&err));
    }
}
