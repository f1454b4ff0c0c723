//! Avatar viewer playback surface

use std::io::Write as _;
use std::time::Duration;

use async_trait::async_trait;

use super::screenplay::Screenplay;
use super::synthesis::AudioBuffer;
use crate::Result;

/// Default speaking rate used to time silent lines
pub const DEFAULT_CHARS_PER_SECOND: f64 = 12.0;

/// Shortest time a line is held on the surface
const MIN_LINE_DURATION: Duration = Duration::from_millis(300);

/// Surface that speaks and animates a screenplay
///
/// `speak` takes `&mut self`: the sequencer hands out the surface to one
/// playback at a time.
#[async_trait]
pub trait Viewer: Send {
    /// Whether the avatar model is loaded and able to play
    fn is_loaded(&self) -> bool;

    /// Speak `screenplay`, lip-syncing to `audio` when present
    ///
    /// Resolves once playback has finished.
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    async fn speak(&mut self, audio: Option<&AudioBuffer>, screenplay: &Screenplay) -> Result<()>;
}

/// Estimate how long `text` takes to say at `chars_per_second`
#[must_use]
pub fn speaking_duration(text: &str, chars_per_second: f64) -> Duration {
    let chars = text.chars().filter(|c| !c.is_whitespace()).count();
    if chars == 0 || chars_per_second <= 0.0 {
        return Duration::ZERO;
    }

    #[allow(clippy::cast_precision_loss)]
    let secs = chars as f64 / chars_per_second;
    Duration::from_secs_f64(secs).max(MIN_LINE_DURATION)
}

/// Text-only viewer that prints each line with its expression
///
/// Holds the surface for the estimated speaking time of the line so the
/// pacing matches what a rendered avatar would do.
#[derive(Debug, Clone)]
pub struct ConsoleViewer {
    chars_per_second: f64,
}

impl ConsoleViewer {
    /// Create a console viewer pacing lines at `chars_per_second`
    #[must_use]
    pub const fn new(chars_per_second: f64) -> Self {
        Self { chars_per_second }
    }
}

impl Default for ConsoleViewer {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_SECOND)
    }
}

#[async_trait]
impl Viewer for ConsoleViewer {
    fn is_loaded(&self) -> bool {
        true
    }

    async fn speak(&mut self, audio: Option<&AudioBuffer>, screenplay: &Screenplay) -> Result<()> {
        tracing::debug!(
            expression = %screenplay.expression(),
            audio_bytes = audio.map_or(0, AudioBuffer::len),
            "speaking line"
        );

        {
            let mut out = std::io::stdout().lock();
            writeln!(out, "({}) {}", screenplay.expression(), screenplay.message())?;
            out.flush()?;
        }

        tokio::time::sleep(speaking_duration(screenplay.message(), self.chars_per_second)).await;
        Ok(())
    }
}
