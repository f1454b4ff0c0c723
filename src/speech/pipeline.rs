//! Speech pipeline facade
//!
//! Bundles the scheduler and the animation queue around one shared viewer,
//! and routes lines to one or the other depending on the mute state.

use std::path::PathBuf;
use std::sync::Arc;

use super::animation::AnimationQueue;
use super::scheduler::{SchedulerConfig, SpeakCallbacks, SpeechScheduler};
use super::screenplay::{Screenplay, VoiceParams};
use super::segmenter::SentenceSplitter;
use super::sequencer::PlaybackSequencer;
use super::synthesis::Synthesizer;
use super::viewer::Viewer;
use crate::Result;

/// Speaks or animates screenplays in order on a single viewer
#[derive(Debug)]
pub struct SpeechPipeline {
    scheduler: SpeechScheduler,
    animation: AnimationQueue,
    muted: bool,
}

impl SpeechPipeline {
    /// Build a pipeline that owns `viewer`
    #[must_use]
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        viewer: impl Viewer + 'static,
        config: SchedulerConfig,
    ) -> Self {
        Self::with_sequencer(synthesizer, PlaybackSequencer::new(viewer), config)
    }

    /// Build a pipeline on an existing sequencer
    #[must_use]
    pub fn with_sequencer(
        synthesizer: Arc<dyn Synthesizer>,
        sequencer: PlaybackSequencer,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            scheduler: SpeechScheduler::new(synthesizer, sequencer.clone(), config),
            animation: AnimationQueue::new(sequencer),
            muted: false,
        }
    }

    /// Whether lines are animated instead of spoken
    #[must_use]
    pub const fn is_muted(&self) -> bool {
        self.muted
    }

    /// Switch between speaking and animating
    pub fn set_muted(&mut self, muted: bool) {
        if self.muted != muted {
            tracing::info!(muted, "speech mute changed");
        }
        self.muted = muted;
    }

    /// Speak one line, or animate it when muted
    ///
    /// Callbacks only fire for spoken lines.
    ///
    /// # Errors
    ///
    /// Returns error if the scheduler has stopped
    pub async fn speak(&mut self, screenplay: Screenplay, callbacks: SpeakCallbacks) -> Result<()> {
        if self.muted {
            self.animation.enqueue(screenplay);
            return Ok(());
        }

        self.scheduler.schedule(screenplay, callbacks).await?;
        Ok(())
    }

    /// Speak one line from a local audio file, or animate it when muted
    ///
    /// # Errors
    ///
    /// Returns error if the scheduler has stopped
    pub async fn speak_local(
        &mut self,
        path: impl Into<PathBuf>,
        screenplay: Screenplay,
        callbacks: SpeakCallbacks,
    ) -> Result<()> {
        if self.muted {
            self.animation.enqueue(screenplay);
            return Ok(());
        }

        self.scheduler
            .schedule_local(path, screenplay, callbacks)
            .await?;
        Ok(())
    }

    /// Segment a complete text and speak every sentence
    ///
    /// Returns the number of lines queued.
    ///
    /// # Errors
    ///
    /// Returns error if the scheduler has stopped
    pub async fn speak_text(&mut self, text: &str, voice: VoiceParams) -> Result<usize> {
        let mut splitter = SentenceSplitter::new();
        let mut sentences = splitter.push(text);
        sentences.extend(splitter.finish());

        let count = sentences.len();
        for sentence in sentences {
            let screenplay = Screenplay::new(sentence.tag.as_deref(), &sentence.sentence, voice);
            self.speak(screenplay, SpeakCallbacks::none()).await?;
        }

        Ok(count)
    }

    /// Animate lines without audio, regardless of the mute state
    pub fn animate(&self, screenplays: impl IntoIterator<Item = Screenplay>) {
        self.animation.enqueue_all(screenplays);
    }

    /// Wait until every queued line has played
    pub async fn idle(&self) {
        self.scheduler.idle().await;
        self.animation.idle().await;
    }

    /// Drain both queues and stop the workers
    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
        self.animation.shutdown().await;
    }
}
