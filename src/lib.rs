//! Avatar Speech - streaming speech playback for talking avatar assistants
//!
//! This library turns a streamed language-model reply into spoken, animated
//! output:
//! - Sentence segmentation of the arriving text, with `[emotion]` tags
//! - Throttled, pipelined speech synthesis (Koeiromap, Coqui TTS)
//! - In-order playback on a single avatar viewer
//! - Muted, audio-less animation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Chat stream (SSE)                    │
//! │        OpenAI  │  Ollama  │  llama.cpp  │  ...       │
//! └────────────────────┬────────────────────────────────┘
//!                      │ text fragments
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Speech pipeline                      │
//! │  Splitter  │  Fetch queue  │  Playback queue  │ Anim │
//! └────────────────────┬────────────────────────────────┘
//!                      │ audio + screenplay
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Avatar viewer                       │
//! │          Console  │  Speaker  │  ...                 │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod speech;

pub use config::Config;
pub use error::{Error, Result};
pub use speech::{Emotion, Screenplay, SpeechPipeline, TalkStyle, VoiceParams};
