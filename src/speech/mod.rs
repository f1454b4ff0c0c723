//! Streaming speech playback
//!
//! Splits streamed text into sentences, synthesizes them under a throttle
//! and plays them back in order on the avatar viewer.

mod animation;
mod pipeline;
#[cfg(feature = "speaker")]
mod playback;
mod scheduler;
mod screenplay;
pub mod segmenter;
mod sequencer;
mod synthesis;
mod throttle;
mod viewer;

pub use animation::AnimationQueue;
pub use pipeline::SpeechPipeline;
#[cfg(feature = "speaker")]
pub use playback::SpeakerViewer;
pub use scheduler::{DEFAULT_QUEUE_CAPACITY, SchedulerConfig, SpeakCallbacks, SpeechScheduler};
pub use screenplay::{Emotion, SPEAKER_RANGE, Screenplay, Talk, TalkStyle, VoiceParams};
pub use segmenter::{
    Extraction, SOFT_BOUNDARY_MIN_CHARS, Segment, SentenceSplitter, TaggedSentence, extract_next,
    is_unpronounceable,
};
pub use sequencer::PlaybackSequencer;
pub use synthesis::{
    AudioBuffer, AudioFormat, Synthesizer, TextToSpeech, decode_data_uri, load_local_audio,
};
pub use throttle::{DEFAULT_THROTTLE_INTERVAL, Throttle};
pub use viewer::{ConsoleViewer, DEFAULT_CHARS_PER_SECOND, Viewer, speaking_duration};
