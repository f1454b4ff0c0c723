//! Configuration management for the speech pipeline
//!
//! Values resolve as env > toml > default. The binary applies CLI flags on
//! top of the loaded [`Config`].

pub mod file;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::speech::{
    DEFAULT_CHARS_PER_SECOND, DEFAULT_QUEUE_CAPACITY, DEFAULT_THROTTLE_INTERVAL, SchedulerConfig,
    VoiceParams,
};
use crate::{Error, Result};

/// Default Koeiromap inference endpoint
pub const DEFAULT_KOEIROMAP_URL: &str = "https://api.rinna.co.jp/koeiromap/v1.0/infer";

/// Default Coqui TTS server root
pub const DEFAULT_COQUI_URL: &str = "http://localhost:5002";

/// Default chat completions endpoint (a local Ollama server)
pub const DEFAULT_CHAT_URL: &str = "http://localhost:11434/v1/chat/completions";

/// Default chat model
pub const DEFAULT_CHAT_MODEL: &str = "llama3.2";

const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Speech pipeline configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Synthesis backend
    pub synthesis: SynthesisConfig,

    /// Voice character sent with every line
    pub voice: VoiceParams,

    /// Scheduling and pacing
    pub pipeline: PipelineConfig,

    /// Chat completion endpoint
    pub chat: ChatConfig,

    /// Animate lines without fetching speech
    pub muted: bool,
}

/// Which synthesis service to call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SynthesisBackend {
    /// Koeiromap JSON API (MP3, needs a subscription key)
    Koeiromap,
    /// Coqui TTS server (WAV)
    #[default]
    Coqui,
}

impl SynthesisBackend {
    /// Endpoint used when none is configured
    #[must_use]
    pub const fn default_url(self) -> &'static str {
        match self {
            Self::Koeiromap => DEFAULT_KOEIROMAP_URL,
            Self::Coqui => DEFAULT_COQUI_URL,
        }
    }
}

impl FromStr for SynthesisBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "koeiromap" | "koeiro" => Ok(Self::Koeiromap),
            "coqui" | "tts" => Ok(Self::Coqui),
            other => Err(Error::Config(format!("unknown synthesis backend: {other}"))),
        }
    }
}

impl fmt::Display for SynthesisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Koeiromap => "koeiromap",
            Self::Coqui => "coqui",
        })
    }
}

/// Synthesis backend configuration
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Selected backend
    pub backend: SynthesisBackend,

    /// Endpoint (Koeiromap) or server root (Coqui)
    pub url: String,

    /// Koeiromap subscription key
    pub api_key: Option<String>,

    /// Coqui speaker
    pub speaker_id: Option<String>,

    /// Coqui language
    pub language_id: Option<String>,

    /// Coqui style reference clip
    pub style_wav: Option<String>,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            backend: SynthesisBackend::default(),
            url: DEFAULT_COQUI_URL.to_string(),
            api_key: None,
            speaker_id: None,
            language_id: None,
            style_wav: None,
            timeout: DEFAULT_SYNTHESIS_TIMEOUT,
        }
    }
}

/// Scheduler and pacing configuration
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Minimum spacing between synthesis calls
    pub throttle_interval: Duration,

    /// Queue depth before scheduling waits
    pub queue_capacity: usize,

    /// Pacing for lines played without audio
    pub chars_per_second: f64,
}

impl PipelineConfig {
    /// Scheduler settings derived from this config
    #[must_use]
    pub const fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            throttle_interval: self.throttle_interval,
            queue_capacity: self.queue_capacity,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            chars_per_second: DEFAULT_CHARS_PER_SECOND,
        }
    }
}

/// Chat endpoint configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// OpenAI-compatible chat completions URL
    pub url: String,

    /// Model name
    pub model: String,

    /// Bearer token (not needed for local servers)
    pub api_key: Option<String>,

    /// System prompt; `None` uses the built-in prompt
    pub system_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CHAT_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            api_key: None,
            system_prompt: None,
        }
    }
}

impl Config {
    /// Load configuration from the config file and the process environment
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed config file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if the backend name is unknown or a voice preset does not exist
    pub fn from_sources(
        fc: file::AvatarConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        // Synthesis (env > toml > default)
        let backend = env("AVATAR_SYNTH_BACKEND")
            .or(fc.synthesis.backend)
            .map(|s| s.parse::<SynthesisBackend>())
            .transpose()?
            .unwrap_or_default();

        let synthesis = SynthesisConfig {
            backend,
            url: env("AVATAR_SYNTH_URL")
                .or(fc.synthesis.url)
                .unwrap_or_else(|| backend.default_url().to_string()),
            api_key: env("KOEIROMAP_API_KEY").or(fc.synthesis.api_key),
            speaker_id: fc.synthesis.speaker_id,
            language_id: fc.synthesis.language_id,
            style_wav: fc.synthesis.style_wav,
            timeout: fc
                .synthesis
                .timeout_secs
                .map_or(DEFAULT_SYNTHESIS_TIMEOUT, Duration::from_secs),
        };

        // Voice (env > toml coordinates > toml preset > preset B)
        let preset = match fc.voice.preset.as_deref() {
            Some(name) => VoiceParams::preset(name)
                .ok_or_else(|| Error::Config(format!("unknown voice preset: {name}")))?,
            None => VoiceParams::default(),
        };
        let voice = VoiceParams::new(
            parse_env(&env, "AVATAR_SPEAKER_X")
                .or(fc.voice.speaker_x)
                .unwrap_or(preset.speaker_x),
            parse_env(&env, "AVATAR_SPEAKER_Y")
                .or(fc.voice.speaker_y)
                .unwrap_or(preset.speaker_y),
        );

        let pipeline = PipelineConfig {
            throttle_interval: parse_env(&env, "AVATAR_THROTTLE_MS")
                .or(fc.pipeline.throttle_ms)
                .map_or(DEFAULT_THROTTLE_INTERVAL, Duration::from_millis),
            queue_capacity: parse_env(&env, "AVATAR_QUEUE_CAPACITY")
                .or(fc.pipeline.queue_capacity)
                .unwrap_or(DEFAULT_QUEUE_CAPACITY)
                .max(1),
            chars_per_second: fc
                .pipeline
                .chars_per_second
                .filter(|cps| *cps > 0.0)
                .unwrap_or(DEFAULT_CHARS_PER_SECOND),
        };

        let chat = ChatConfig {
            url: env("AVATAR_CHAT_URL")
                .or(fc.chat.url)
                .unwrap_or_else(|| DEFAULT_CHAT_URL.to_string()),
            model: env("AVATAR_CHAT_MODEL")
                .or(fc.chat.model)
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            api_key: env("OPENAI_API_KEY").or(fc.chat.api_key),
            system_prompt: env("AVATAR_SYSTEM_PROMPT").or(fc.chat.system_prompt),
        };

        let muted = env("AVATAR_MUTED")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .or(fc.muted)
            .unwrap_or(false);

        if synthesis.backend == SynthesisBackend::Koeiromap && synthesis.api_key.is_none() {
            tracing::warn!("koeiromap backend selected without KOEIROMAP_API_KEY");
        }

        Ok(Self {
            synthesis,
            voice,
            pipeline,
            chat,
            muted,
        })
    }
}

/// Parse an env value, ignoring it (with a warning) when malformed
fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring malformed environment value");
            None
        }
    }
}
