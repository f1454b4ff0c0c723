//! Ordered, audio-less playback for muted lines

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::screenplay::Screenplay;
use super::sequencer::PlaybackSequencer;

/// Queue of screenplays played one at a time without audio
///
/// Shares the viewer with the speech scheduler through the sequencer, so
/// an animated line never overlaps a spoken one.
pub struct AnimationQueue {
    tx: mpsc::UnboundedSender<Screenplay>,
    queued: watch::Sender<usize>,
    worker: JoinHandle<()>,
}

impl AnimationQueue {
    /// Start draining into `sequencer`
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(sequencer: PlaybackSequencer) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (queued, _) = watch::channel(0usize);
        let worker = tokio::spawn(drain(rx, sequencer, queued.clone()));

        Self { tx, queued, worker }
    }

    /// Append one screenplay
    pub fn enqueue(&self, screenplay: Screenplay) {
        self.queued.send_modify(|n| *n += 1);
        if self.tx.send(screenplay).is_err() {
            self.queued.send_modify(|n| *n = n.saturating_sub(1));
            tracing::warn!("animation queue closed, dropping line");
        }
    }

    /// Append screenplays in order
    pub fn enqueue_all(&self, screenplays: impl IntoIterator<Item = Screenplay>) {
        for screenplay in screenplays {
            self.enqueue(screenplay);
        }
    }

    /// Lines not yet played
    #[must_use]
    pub fn len(&self) -> usize {
        *self.queued.borrow()
    }

    /// Whether every queued line has played
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until the queue has drained
    pub async fn idle(&self) {
        let mut rx = self.queued.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting lines and play out what is queued
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            tracing::error!(error = %e, "animation worker panicked");
        }
    }
}

impl std::fmt::Debug for AnimationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationQueue")
            .field("queued", &self.len())
            .finish_non_exhaustive()
    }
}

async fn drain(
    mut rx: mpsc::UnboundedReceiver<Screenplay>,
    sequencer: PlaybackSequencer,
    queued: watch::Sender<usize>,
) {
    while let Some(screenplay) = rx.recv().await {
        tracing::debug!(message = screenplay.message(), "animating line");
        sequencer.play(None, &screenplay).await;
        queued.send_modify(|n| *n = n.saturating_sub(1));
    }
}
