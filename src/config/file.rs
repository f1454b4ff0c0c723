//! TOML configuration file loading
//!
//! Supports `~/.config/avatar-speech/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AvatarConfigFile {
    /// Start muted (animate lines without speech)
    #[serde(default)]
    pub muted: Option<bool>,

    /// Speech synthesis backend
    #[serde(default)]
    pub synthesis: SynthesisFileConfig,

    /// Voice character
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Scheduling and pacing
    #[serde(default)]
    pub pipeline: PipelineFileConfig,

    /// Chat completion endpoint
    #[serde(default)]
    pub chat: ChatFileConfig,
}

/// Speech synthesis backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct SynthesisFileConfig {
    /// Backend name ("koeiromap" or "coqui")
    pub backend: Option<String>,

    /// Endpoint (Koeiromap) or server root (Coqui)
    pub url: Option<String>,

    /// Koeiromap subscription key
    pub api_key: Option<String>,

    /// Coqui speaker
    pub speaker_id: Option<String>,

    /// Coqui language
    pub language_id: Option<String>,

    /// Coqui style reference clip
    pub style_wav: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Voice character configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Named preset ("A" to "D")
    pub preset: Option<String>,

    /// Explicit speaker X coordinate, overrides the preset
    pub speaker_x: Option<f64>,

    /// Explicit speaker Y coordinate, overrides the preset
    pub speaker_y: Option<f64>,
}

/// Scheduler configuration
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// Minimum spacing between synthesis calls in milliseconds
    pub throttle_ms: Option<u64>,

    /// Queue depth before scheduling waits
    pub queue_capacity: Option<usize>,

    /// Pacing for lines played without audio
    pub chars_per_second: Option<f64>,
}

/// Chat endpoint configuration
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// OpenAI-compatible chat completions URL
    pub url: Option<String>,

    /// Model name
    pub model: Option<String>,

    /// Bearer token
    pub api_key: Option<String>,

    /// System prompt override
    pub system_prompt: Option<String>,
}

/// Load the TOML config file from the default path
///
/// Returns `AvatarConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> AvatarConfigFile {
    config_file_path().map_or_else(AvatarConfigFile::default, |path| load_config_from(&path))
}

/// Load the TOML config file at `path`
///
/// Missing or unparseable files fall back to defaults.
pub fn load_config_from(path: &Path) -> AvatarConfigFile {
    if !path.exists() {
        return AvatarConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AvatarConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AvatarConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/avatar-speech/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("avatar-speech").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let fc: AvatarConfigFile = toml::from_str(
            r#"
            muted = true

            [synthesis]
            backend = "koeiromap"
            api_key = "key"

            [pipeline]
            throttle_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(fc.muted, Some(true));
        assert_eq!(fc.synthesis.backend.as_deref(), Some("koeiromap"));
        assert_eq!(fc.synthesis.api_key.as_deref(), Some("key"));
        assert_eq!(fc.pipeline.throttle_ms, Some(1500));
        assert!(fc.chat.url.is_none());
        assert!(fc.voice.preset.is_none());
    }

    #[test]
    fn unparseable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "muted = [not toml").unwrap();

        let fc = load_config_from(&path);
        assert!(fc.muted.is_none());
    }

    #[test]
    fn missing_file_is_default() {
        let fc = load_config_from(Path::new("/nonexistent/avatar-speech/config.toml"));
        assert!(fc.synthesis.backend.is_none());
    }
}
