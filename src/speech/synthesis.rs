//! Text-to-speech synthesis backends

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use url::Url;

use super::screenplay::Talk;
use crate::config::{SynthesisBackend, SynthesisConfig};
use crate::{Error, Result};

/// Encoded audio returned by a backend (MP3 or WAV)
#[derive(Clone, PartialEq, Eq)]
pub struct AudioBuffer(Arc<[u8]>);

/// Container format of an [`AudioBuffer`], sniffed from its header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioBuffer {
    /// Wrap encoded audio bytes
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Raw encoded bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the buffer holds no audio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Container format; anything that is not RIFF/WAVE is treated as MP3
    #[must_use]
    pub fn format(&self) -> AudioFormat {
        if self.0.len() >= 12 && &self.0[0..4] == b"RIFF" && &self.0[8..12] == b"WAVE" {
            AudioFormat::Wav
        } else {
            AudioFormat::Mp3
        }
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("len", &self.0.len())
            .field("format", &self.format())
            .finish()
    }
}

impl From<Vec<u8>> for AudioBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

/// Converts one [`Talk`] into audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Synthesize a single sentence
    ///
    /// # Errors
    ///
    /// Returns error on network failure, non-2xx status or a malformed payload
    async fn synthesize(&self, talk: &Talk) -> Result<AudioBuffer>;
}

/// TTS provider backend
#[derive(Clone, Debug)]
enum TtsProvider {
    Koeiromap {
        api_key: String,
    },
    Coqui {
        speaker_id: Option<String>,
        language_id: Option<String>,
        style_wav: Option<String>,
    },
}

/// Synthesizes speech through an HTTP backend
pub struct TextToSpeech {
    client: reqwest::Client,
    endpoint: Url,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a TTS instance for a Koeiromap-style JSON endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or the endpoint is not a URL
    pub fn new_koeiromap(endpoint: &str, api_key: String, timeout: Duration) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Koeiromap API key required for TTS".to_string()));
        }

        Ok(Self {
            client: build_client(timeout)?,
            endpoint: parse_endpoint(endpoint)?,
            provider: TtsProvider::Koeiromap { api_key },
        })
    }

    /// Create a TTS instance for a Coqui TTS server
    ///
    /// `base_url` is the server root; requests go to `{base_url}/api/tts`.
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is not a URL
    pub fn new_coqui(
        base_url: &str,
        speaker_id: Option<String>,
        language_id: Option<String>,
        style_wav: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut base = parse_endpoint(base_url)?;
        // Join against the root as a directory, never replacing its last segment
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("api/tts")
            .map_err(|e| Error::Config(format!("invalid Coqui URL {base_url}: {e}")))?;

        Ok(Self {
            client: build_client(timeout)?,
            endpoint,
            provider: TtsProvider::Coqui {
                speaker_id,
                language_id,
                style_wav,
            },
        })
    }

    /// Create the backend selected in the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the selected backend is misconfigured
    pub fn from_config(config: &SynthesisConfig) -> Result<Self> {
        match config.backend {
            SynthesisBackend::Koeiromap => Self::new_koeiromap(
                &config.url,
                config.api_key.clone().unwrap_or_default(),
                config.timeout,
            ),
            SynthesisBackend::Coqui => Self::new_coqui(
                &config.url,
                config.speaker_id.clone(),
                config.language_id.clone(),
                config.style_wav.clone(),
                config.timeout,
            ),
        }
    }

    /// Endpoint requests are sent to
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Synthesize using a Koeiromap-style JSON API
    async fn synthesize_koeiromap(&self, talk: &Talk, api_key: &str) -> Result<AudioBuffer> {
        #[derive(serde::Serialize)]
        struct KoeiromapRequest<'a> {
            text: &'a str,
            speaker_x: f64,
            speaker_y: f64,
            style: &'a str,
            output_format: &'a str,
        }

        #[derive(serde::Deserialize)]
        struct KoeiromapResponse {
            audio: Option<String>,
        }

        let request = KoeiromapRequest {
            text: &talk.message,
            speaker_x: talk.speaker_x,
            speaker_y: talk.speaker_y,
            style: talk.style.as_str(),
            output_format: "mp3",
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Cache-Control", "no-cache")
            .header("Ocp-Apim-Subscription-Key", api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("Koeiromap error {status}: {body}")));
        }

        let payload: KoeiromapResponse = response.json().await?;
        let audio = payload
            .audio
            .filter(|a| !a.is_empty())
            .ok_or_else(|| Error::Synthesis("Koeiromap response carried no audio".to_string()))?;

        self.resolve_audio_reference(&audio).await
    }

    /// Turn the `audio` field into bytes: inline data URI or a URL to fetch
    async fn resolve_audio_reference(&self, reference: &str) -> Result<AudioBuffer> {
        if reference.starts_with("data:") {
            return decode_data_uri(reference);
        }

        let url = self
            .endpoint
            .join(reference)
            .map_err(|e| Error::Synthesis(format!("bad audio reference {reference}: {e}")))?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Synthesis(format!(
                "audio download failed: {}",
                response.status()
            )));
        }

        non_empty(response.bytes().await?.to_vec())
    }

    /// Synthesize using a Coqui TTS server
    async fn synthesize_coqui(
        &self,
        talk: &Talk,
        speaker_id: Option<&str>,
        language_id: Option<&str>,
        style_wav: Option<&str>,
    ) -> Result<AudioBuffer> {
        let mut query = vec![("text", talk.message.as_str())];
        query.extend(speaker_id.map(|v| ("speaker_id", v)));
        query.extend(language_id.map(|v| ("language_id", v)));
        query.extend(style_wav.map(|v| ("style_wav", v)));

        let response = self
            .client
            .get(self.endpoint.clone())
            .header("Cache-Control", "no-cache")
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("Coqui TTS error {status}: {body}")));
        }

        non_empty(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    fn name(&self) -> &'static str {
        match self.provider {
            TtsProvider::Koeiromap { .. } => "koeiromap",
            TtsProvider::Coqui { .. } => "coqui",
        }
    }

    async fn synthesize(&self, talk: &Talk) -> Result<AudioBuffer> {
        match &self.provider {
            TtsProvider::Koeiromap { api_key } => self.synthesize_koeiromap(talk, api_key).await,
            TtsProvider::Coqui {
                speaker_id,
                language_id,
                style_wav,
            } => {
                self.synthesize_coqui(
                    talk,
                    speaker_id.as_deref(),
                    language_id.as_deref(),
                    style_wav.as_deref(),
                )
                .await
            }
        }
    }
}

/// Load audio from a local file instead of a synthesis backend
///
/// # Errors
///
/// Returns error if the file cannot be read or is empty
pub async fn load_local_audio(path: &Path) -> Result<AudioBuffer> {
    let bytes = tokio::fs::read(path).await?;
    if bytes.is_empty() {
        return Err(Error::Audio(format!("{} is empty", path.display())));
    }
    Ok(AudioBuffer::from(bytes))
}

/// Decode a base64 `data:` URI (e.g. `data:audio/mpeg;base64,...`)
///
/// # Errors
///
/// Returns error if the URI is not base64 encoded or fails to decode
pub fn decode_data_uri(uri: &str) -> Result<AudioBuffer> {
    let (header, data) = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| Error::Synthesis("malformed data URI".to_string()))?;

    if !header.ends_with(";base64") {
        return Err(Error::Synthesis(format!(
            "unsupported data URI encoding: {header}"
        )));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| Error::Synthesis(format!("invalid base64 audio: {e}")))?;

    non_empty(bytes)
}

fn non_empty(bytes: Vec<u8>) -> Result<AudioBuffer> {
    if bytes.is_empty() {
        return Err(Error::Synthesis("backend returned empty audio".to_string()));
    }
    Ok(AudioBuffer::from(bytes))
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

fn parse_endpoint(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::Config(format!("invalid URL {raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Config(format!("unsupported URL scheme in {raw}")));
    }
    Ok(url)
}
