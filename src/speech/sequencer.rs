//! One-at-a-time access to the viewer playback surface

use std::sync::Arc;

use tokio::sync::Mutex;

use super::screenplay::Screenplay;
use super::synthesis::AudioBuffer;
use super::viewer::Viewer;

/// Serializes playback on a shared viewer
///
/// Clones share the same surface. The async mutex is FIFO-fair, so callers
/// play in the order they asked, and never more than one at a time.
#[derive(Clone)]
pub struct PlaybackSequencer {
    viewer: Arc<Mutex<Box<dyn Viewer>>>,
}

impl PlaybackSequencer {
    /// Take ownership of a viewer
    #[must_use]
    pub fn new(viewer: impl Viewer + 'static) -> Self {
        Self::from_boxed(Box::new(viewer))
    }

    /// Take ownership of an already boxed viewer
    #[must_use]
    pub fn from_boxed(viewer: Box<dyn Viewer>) -> Self {
        Self {
            viewer: Arc::new(Mutex::new(viewer)),
        }
    }

    /// Play one line and wait for it to finish
    ///
    /// Never fails: a viewer without a loaded model turns this into a no-op
    /// and playback errors are logged.
    pub async fn play(&self, audio: Option<&AudioBuffer>, screenplay: &Screenplay) {
        let mut viewer = self.viewer.lock().await;

        if !viewer.is_loaded() {
            tracing::debug!(
                message = screenplay.message(),
                "viewer model not loaded, skipping playback"
            );
            return;
        }

        if let Err(e) = viewer.speak(audio, screenplay).await {
            tracing::warn!(error = %e, "viewer playback failed");
        }
    }
}

impl std::fmt::Debug for PlaybackSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSequencer").finish_non_exhaustive()
    }
}
