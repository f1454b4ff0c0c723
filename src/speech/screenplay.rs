//! Screenplay data model: what to say, how, and with which expression

use std::fmt;

use serde::{Deserialize, Serialize};

/// Bound of the voice character coordinate space (both axes)
pub const SPEAKER_RANGE: f64 = 10.0;

/// Voice style sent to the synthesis backend
///
/// Backends speak the Koeiromap vocabulary where neutral is `talk`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TalkStyle {
    /// Plain talking voice
    #[default]
    #[serde(rename = "talk", alias = "neutral")]
    Neutral,
    /// Cheerful voice
    Happy,
    /// Downcast voice
    Sad,
}

impl TalkStyle {
    /// Normalize a free-form style; anything unknown becomes neutral
    #[must_use]
    pub fn reduce(style: &str) -> Self {
        match style {
            "happy" => Self::Happy,
            "sad" => Self::Sad,
            _ => Self::Neutral,
        }
    }

    /// Wire name of the style
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "talk",
            Self::Happy => "happy",
            Self::Sad => "sad",
        }
    }
}

impl fmt::Display for TalkStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Avatar facial expression
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Angry,
    Sad,
    Relaxed,
}

impl Emotion {
    /// Parse a tag label such as `happy` (brackets already removed)
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "neutral" => Some(Self::Neutral),
            "happy" => Some(Self::Happy),
            "angry" => Some(Self::Angry),
            "sad" => Some(Self::Sad),
            "relaxed" => Some(Self::Relaxed),
            _ => None,
        }
    }

    /// Voice style matching this expression
    #[must_use]
    pub const fn talk_style(self) -> TalkStyle {
        match self {
            Self::Happy => TalkStyle::Happy,
            Self::Sad => TalkStyle::Sad,
            Self::Neutral | Self::Angry | Self::Relaxed => TalkStyle::Neutral,
        }
    }

    /// Lowercase label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Angry => "angry",
            Self::Sad => "sad",
            Self::Relaxed => "relaxed",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voice character coordinates, clamped to `[-SPEAKER_RANGE, SPEAKER_RANGE]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    pub speaker_x: f64,
    pub speaker_y: f64,
}

impl VoiceParams {
    /// Bright, high voice
    pub const PRESET_A: Self = Self {
        speaker_x: 4.5,
        speaker_y: 10.0,
    };
    /// Default voice
    pub const PRESET_B: Self = Self {
        speaker_x: 3.0,
        speaker_y: 3.0,
    };
    /// Low, calm voice
    pub const PRESET_C: Self = Self {
        speaker_x: -5.5,
        speaker_y: -3.0,
    };
    /// Deep voice
    pub const PRESET_D: Self = Self {
        speaker_x: 3.5,
        speaker_y: -8.0,
    };

    /// Create voice params, clamping both coordinates into range
    #[must_use]
    pub fn new(speaker_x: f64, speaker_y: f64) -> Self {
        Self {
            speaker_x: clamp_coordinate(speaker_x),
            speaker_y: clamp_coordinate(speaker_y),
        }
    }

    /// Look up a preset by letter (`a`..`d`, case-insensitive)
    #[must_use]
    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "a" => Some(Self::PRESET_A),
            "b" => Some(Self::PRESET_B),
            "c" => Some(Self::PRESET_C),
            "d" => Some(Self::PRESET_D),
            _ => None,
        }
    }
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self::PRESET_B
    }
}

fn clamp_coordinate(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(-SPEAKER_RANGE, SPEAKER_RANGE)
}

/// Synthesis request payload for one sentence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Talk {
    pub message: String,
    pub speaker_x: f64,
    pub speaker_y: f64,
    pub style: TalkStyle,
}

/// One sentence plus its delivery metadata
///
/// Immutable once built; the pipeline only moves it between queues.
#[derive(Debug, Clone, PartialEq)]
pub struct Screenplay {
    talk: Talk,
    expression: Emotion,
    tag: Option<String>,
}

impl Screenplay {
    /// Build a screenplay from a sentence and the bracket tag in effect
    ///
    /// Any `[...]` tags left inside the sentence are removed from the spoken
    /// message. An unknown tag label keeps the neutral expression.
    #[must_use]
    pub fn new(tag: Option<&str>, sentence: &str, voice: VoiceParams) -> Self {
        let expression = tag
            .map(|t| t.trim_start_matches('[').trim_end_matches(']'))
            .and_then(Emotion::from_label)
            .unwrap_or_default();

        let voice = VoiceParams::new(voice.speaker_x, voice.speaker_y);
        let talk = Talk {
            message: strip_tags(sentence).trim().to_string(),
            speaker_x: voice.speaker_x,
            speaker_y: voice.speaker_y,
            style: expression.talk_style(),
        };

        Self {
            talk,
            expression,
            tag: tag.map(str::to_owned),
        }
    }

    /// Build a screenplay from free text carrying its tag anywhere (`[sad] Oh.`)
    #[must_use]
    pub fn from_text(text: &str, voice: VoiceParams) -> Self {
        Self::new(first_tag(text), text, voice)
    }

    /// Synthesis payload
    #[must_use]
    pub const fn talk(&self) -> &Talk {
        &self.talk
    }

    /// Expression to show while speaking
    #[must_use]
    pub const fn expression(&self) -> Emotion {
        self.expression
    }

    /// Raw tag the sentence was delivered with
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Spoken text
    #[must_use]
    pub fn message(&self) -> &str {
        &self.talk.message
    }
}

/// Byte ranges of every `[...]` tag in `text` (tags never span a newline)
fn tag_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open = None;

    for (i, c) in text.char_indices() {
        match c {
            '[' if open.is_none() => open = Some(i),
            ']' => {
                if let Some(start) = open.take() {
                    spans.push((start, i + 1));
                }
            }
            '\n' => open = None,
            _ => {}
        }
    }

    spans
}

fn first_tag(text: &str) -> Option<&str> {
    tag_spans(text).first().map(|&(start, end)| &text[start..end])
}

fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    for (start, end) in tag_spans(text) {
        out.push_str(&text[cursor..start]);
        cursor = end;
    }

    out.push_str(&text[cursor..]);
    out
}
