use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::audio::ambient::{SfxProvider, SfxRequest};
use crate::config::{ProviderRole, VoiceConfig};
use crate::foundation::error::{FactoryError, FactoryResult, ProviderError};
use crate::narration::NarrationProvider;

/// Container/bitrate requested from the text-to-speech endpoint.
pub const OUTPUT_FORMAT: &str = "mp3_44100_128";

/// Thin HTTP client for the ElevenLabs text-to-speech and sound-generation endpoints.
pub struct ElevenLabsClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for ElevenLabsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevenLabsClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct TtsBody<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_id: Option<&'a str>,
}

impl ElevenLabsClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> FactoryResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| FactoryError::Provider(ProviderError::from(e)))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    pub async fn text_to_speech(
        &self,
        voice: &VoiceConfig,
        text: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice.voice_id);
        debug!(%url, chars = text.chars().count(), "elevenlabs text-to-speech request");
        let resp = self
            .http
            .post(&url)
            .query(&[("output_format", OUTPUT_FORMAT)])
            .header("xi-api-key", &self.api_key)
            .json(&TtsBody {
                text,
                model_id: voice.model_id.as_deref(),
            })
            .send()
            .await?;
        read_audio(resp).await
    }

    pub async fn sound_generation(&self, req: &SfxRequest) -> Result<Vec<u8>, ProviderError> {
        let url = format!("{}/v1/sound-generation", self.base_url);
        debug!(%url, duration_seconds = req.duration_seconds, "elevenlabs sound-generation request");
        let resp = self
            .http
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(req)
            .send()
            .await?;
        read_audio(resp).await
    }
}

async fn read_audio(resp: reqwest::Response) -> Result<Vec<u8>, ProviderError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status.as_u16(), body));
    }
    let bytes = resp.bytes().await?;
    if bytes.is_empty() {
        return Err(ProviderError::EmptyOutput(
            "elevenlabs returned an empty body".to_owned(),
        ));
    }
    Ok(bytes.to_vec())
}

/// Primary narration provider: ElevenLabs with a fixed voice.
#[derive(Debug)]
pub struct ElevenLabsNarrator {
    client: Arc<ElevenLabsClient>,
    voice: VoiceConfig,
}

impl ElevenLabsNarrator {
    pub fn new(client: Arc<ElevenLabsClient>, voice: VoiceConfig) -> Self {
        Self { client, voice }
    }
}

#[async_trait::async_trait]
impl NarrationProvider for ElevenLabsNarrator {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    fn role(&self) -> ProviderRole {
        self.voice.provider
    }

    async fn synthesize(&self, text: &str, out_path: &Path) -> Result<(), ProviderError> {
        let bytes = self.client.text_to_speech(&self.voice, text).await?;
        tokio::fs::write(out_path, &bytes).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SfxProvider for ElevenLabsClient {
    async fn generate(&self, req: &SfxRequest) -> Result<Vec<u8>, ProviderError> {
        self.sound_generation(req).await
    }
}
