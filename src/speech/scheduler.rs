//! Throttled, pipelined speech scheduling
//!
//! Every scheduled line goes through two ordered queues, each drained by a
//! single worker task:
//!
//! ```text
//! schedule() ──► fetch queue ──► fetch worker ──(oneshot audio)──┐
//!           └──► playback queue ──► playback worker ◄────────────┘
//! ```
//!
//! The fetch worker calls the synthesis backend one line at a time, spaced
//! by the throttle, and may run ahead of playback. The playback worker waits
//! for each line's audio and for the previous line to finish, so lines are
//! always spoken in the order they were scheduled.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::screenplay::Screenplay;
use super::sequencer::PlaybackSequencer;
use super::synthesis::{AudioBuffer, Synthesizer, load_local_audio};
use super::throttle::{DEFAULT_THROTTLE_INTERVAL, Throttle};
use crate::{Error, Result};

/// Default number of lines each queue holds before `schedule` waits
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Scheduler tuning
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Minimum gap between the end of one synthesis call and the next
    pub throttle_interval: Duration,
    /// Bounded queue depth; `schedule` suspends while the queue is full
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

type Callback = Box<dyn FnOnce() + Send>;

/// Hooks fired around a line's playback slot
///
/// `on_start` runs right before playback begins, even when the line has no
/// audio. `on_complete` runs after the slot resolves, whatever the outcome.
#[derive(Default)]
pub struct SpeakCallbacks {
    on_start: Option<Callback>,
    on_complete: Option<Callback>,
}

impl SpeakCallbacks {
    /// No callbacks
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Run `f` right before playback starts
    #[must_use]
    pub fn on_start(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    /// Run `f` once the playback slot has resolved
    #[must_use]
    pub fn on_complete(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    fn fire_start(&mut self) {
        if let Some(f) = self.on_start.take() {
            f();
        }
    }

    fn fire_complete(&mut self) {
        if let Some(f) = self.on_complete.take() {
            f();
        }
    }
}

impl std::fmt::Debug for SpeakCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeakCallbacks")
            .field("on_start", &self.on_start.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Where a line's audio comes from
#[derive(Debug)]
enum AudioSource {
    /// Call the synthesis backend (throttled)
    Synthesize,
    /// Read a local file (not an external call, not throttled)
    Local(PathBuf),
}

/// Line waiting for its audio
struct FetchJob {
    seq: u64,
    screenplay: Arc<Screenplay>,
    source: AudioSource,
    reply: oneshot::Sender<Option<AudioBuffer>>,
}

/// Line waiting for its playback slot
struct PlaybackJob {
    seq: u64,
    screenplay: Arc<Screenplay>,
    audio: oneshot::Receiver<Option<AudioBuffer>>,
    callbacks: SpeakCallbacks,
}

/// Schedules synthesis and in-order playback of screenplays
pub struct SpeechScheduler {
    next_seq: u64,
    fetch_tx: mpsc::Sender<FetchJob>,
    playback_tx: mpsc::Sender<PlaybackJob>,
    in_flight: watch::Sender<usize>,
    fetch_worker: JoinHandle<()>,
    playback_worker: JoinHandle<()>,
}

impl SpeechScheduler {
    /// Start the fetch and playback workers
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        sequencer: PlaybackSequencer,
        config: SchedulerConfig,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (fetch_tx, fetch_rx) = mpsc::channel(capacity);
        let (playback_tx, playback_rx) = mpsc::channel(capacity);
        let (in_flight, _) = watch::channel(0usize);

        let fetch_worker = tokio::spawn(run_fetch_queue(
            fetch_rx,
            synthesizer,
            Throttle::new(config.throttle_interval),
        ));
        let playback_worker = tokio::spawn(run_playback_queue(
            playback_rx,
            sequencer,
            in_flight.clone(),
        ));

        Self {
            next_seq: 0,
            fetch_tx,
            playback_tx,
            in_flight,
            fetch_worker,
            playback_worker,
        }
    }

    /// Queue a line for synthesis and playback
    ///
    /// Returns the line's sequence number once it is queued; the line itself
    /// plays later. Waits only while the queues are full.
    ///
    /// # Errors
    ///
    /// Returns error if the workers have stopped
    pub async fn schedule(
        &mut self,
        screenplay: Screenplay,
        callbacks: SpeakCallbacks,
    ) -> Result<u64> {
        self.enqueue(screenplay, AudioSource::Synthesize, callbacks)
            .await
    }

    /// Queue a line whose audio is read from a local file
    ///
    /// Shares the ordering of [`schedule`](Self::schedule) but skips the
    /// synthesis backend and its throttle.
    ///
    /// # Errors
    ///
    /// Returns error if the workers have stopped
    pub async fn schedule_local(
        &mut self,
        path: impl Into<PathBuf>,
        screenplay: Screenplay,
        callbacks: SpeakCallbacks,
    ) -> Result<u64> {
        self.enqueue(screenplay, AudioSource::Local(path.into()), callbacks)
            .await
    }

    async fn enqueue(
        &mut self,
        screenplay: Screenplay,
        source: AudioSource,
        callbacks: SpeakCallbacks,
    ) -> Result<u64> {
        // Both slots are taken before anything is committed, so dropping
        // this future while it waits leaves the scheduler untouched
        let fetch = self
            .fetch_tx
            .reserve()
            .await
            .map_err(|_| Error::QueueClosed("fetch worker stopped".to_string()))?;
        let playback = self
            .playback_tx
            .reserve()
            .await
            .map_err(|_| Error::QueueClosed("playback worker stopped".to_string()))?;

        let seq = self.next_seq;
        let screenplay = Arc::new(screenplay);
        let (reply, audio) = oneshot::channel();

        self.in_flight.send_modify(|n| *n += 1);
        fetch.send(FetchJob {
            seq,
            screenplay: Arc::clone(&screenplay),
            source,
            reply,
        });
        playback.send(PlaybackJob {
            seq,
            screenplay,
            audio,
            callbacks,
        });

        self.next_seq += 1;
        tracing::trace!(seq, "line scheduled");
        Ok(seq)
    }

    /// Number of lines scheduled so far
    #[must_use]
    pub const fn scheduled(&self) -> u64 {
        self.next_seq
    }

    /// Lines scheduled but not yet done playing
    #[must_use]
    pub fn pending(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Wait until every scheduled line has finished playing
    pub async fn idle(&self) {
        let mut rx = self.in_flight.subscribe();
        // The sender lives in `self`, so this only fails if it is dropped
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting lines and wait for the queued ones to play out
    pub async fn shutdown(self) {
        let Self {
            fetch_tx,
            playback_tx,
            fetch_worker,
            playback_worker,
            ..
        } = self;

        drop(fetch_tx);
        drop(playback_tx);

        if let Err(e) = fetch_worker.await {
            tracing::error!(error = %e, "fetch worker panicked");
        }
        if let Err(e) = playback_worker.await {
            tracing::error!(error = %e, "playback worker panicked");
        }
    }
}

impl std::fmt::Debug for SpeechScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechScheduler")
            .field("scheduled", &self.next_seq)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Fetch audio for each line in order, spacing backend calls by the throttle
async fn run_fetch_queue(
    mut rx: mpsc::Receiver<FetchJob>,
    synthesizer: Arc<dyn Synthesizer>,
    mut throttle: Throttle,
) {
    while let Some(job) = rx.recv().await {
        let seq = job.seq;

        let audio = match &job.source {
            AudioSource::Synthesize => {
                throttle.ready().await;
                tracing::debug!(seq, backend = synthesizer.name(), "requesting synthesis");

                let result = synthesizer.synthesize(job.screenplay.talk()).await;
                throttle.record();

                match result {
                    Ok(audio) => Some(audio),
                    Err(e) => {
                        tracing::warn!(seq, error = %e, "synthesis failed, line will play without audio");
                        None
                    }
                }
            }
            AudioSource::Local(path) => match load_local_audio(path).await {
                Ok(audio) => Some(audio),
                Err(e) => {
                    tracing::warn!(seq, path = %path.display(), error = %e, "local audio failed to load");
                    None
                }
            },
        };

        // The playback worker only drops its receiver when shutting down
        let _ = job.reply.send(audio);
    }

    tracing::debug!("fetch queue closed");
}

/// Play each line after its audio is ready and the previous line is done
async fn run_playback_queue(
    mut rx: mpsc::Receiver<PlaybackJob>,
    sequencer: PlaybackSequencer,
    in_flight: watch::Sender<usize>,
) {
    while let Some(mut job) = rx.recv().await {
        let audio = job.audio.await.ok().flatten();

        job.callbacks.fire_start();
        tracing::debug!(seq = job.seq, has_audio = audio.is_some(), "playback started");
        sequencer.play(audio.as_ref(), &job.screenplay).await;
        job.callbacks.fire_complete();

        in_flight.send_modify(|n| *n = n.saturating_sub(1));
        tracing::trace!(seq = job.seq, "playback slot done");
    }

    tracing::debug!("playback queue closed");
}
