//! OpenAI-compatible speech endpoint (`POST /v1/audio/speech`).

use super::{AudioAsset, SynthesisOutput, SynthesisProvider, VoiceSettings};
use crate::cancellation::CancellationToken;
use crate::config::NarrationConfig;
use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::debug;

const CANCEL_POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
    endpoint: String,
    model: String,
    response_format: String,
    api_key: Option<String>,
}

impl HttpProvider {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        response_format: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .context("Building HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            response_format: response_format.into(),
            api_key,
        })
    }

    pub fn from_config(config: &NarrationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.http_api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            debug!(var = %config.http_api_key_env, "No API key set for HTTP speech provider");
        }
        Self::new(
            config.http_endpoint.clone(),
            config.http_model.clone(),
            config.http_response_format.clone(),
            api_key,
        )
    }

    fn fetch(&self, text: &str, voice: &VoiceSettings) -> Result<AudioAsset> {
        let body = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &voice.voice_id,
            speed: voice.rate,
            response_format: &self.response_format,
        };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().context("Sending speech request")?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            bail!("speech endpoint returned {status}: {}", detail.trim());
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .filter(|value| value.starts_with("audio/"))
            .unwrap_or_else(|| format_mime(&self.response_format).to_string());
        let bytes = response.bytes().context("Reading speech response")?;
        if bytes.is_empty() {
            bail!("speech endpoint returned no audio");
        }
        Ok(AudioAsset::new(bytes.to_vec(), mime_type))
    }
}

impl SynthesisProvider for HttpProvider {
    fn id(&self) -> &str {
        "http"
    }

    /// The blocking request runs on a helper thread so cancellation is
    /// observed while the response is outstanding. A cancelled request is
    /// abandoned; its eventual result is dropped.
    fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSettings,
        cancel: &CancellationToken,
    ) -> Result<SynthesisOutput> {
        cancel.check_cancelled("http:start")?;
        debug!(
            endpoint = %self.endpoint,
            voice = %voice.voice_id,
            chars = text.len(),
            "Requesting speech"
        );
        let (tx, rx) = mpsc::channel();
        let provider = self.clone();
        let text = text.to_string();
        let voice = voice.clone();
        thread::Builder::new()
            .name("http-speech".to_string())
            .spawn(move || {
                let _ = tx.send(provider.fetch(&text, &voice));
            })
            .context("Spawning speech request thread")?;

        loop {
            cancel.check_cancelled("http:wait")?;
            match rx.recv_timeout(CANCEL_POLL) {
                Ok(result) => {
                    let asset = result?;
                    cancel.check_cancelled("http:done")?;
                    return Ok(SynthesisOutput::asset(asset));
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("speech request thread exited without a result"));
                }
            }
        }
    }
}

fn format_mime(format: &str) -> &'static str {
    match format {
        "mp3" => "audio/mpeg",
        "opus" | "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        _ => "audio/wav",
    }
}
