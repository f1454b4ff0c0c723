//! Chat turn driver
//!
//! Streams an assistant reply, speaks it sentence by sentence while it is
//! still arriving, and records the spoken transcript.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;

use super::log::{ChatLog, Message};
use super::stream::ChatBackend;
use crate::Result;
use crate::speech::{
    Screenplay, SentenceSplitter, SpeakCallbacks, SpeechPipeline, TaggedSentence, VoiceParams,
};

/// Line spoken when the session starts
pub const INTRODUCTION: &str = "Hello! Welcome to the VRM experience. How can I assist you today?";

/// System prompt used when none is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a friendly assistant speaking through an animated avatar. \
Keep replies short and conversational, as if talking out loud. \
Start each sentence with one emotion tag chosen from [neutral], [happy], \
[angry], [sad] and [relaxed], for example: \
[happy]Nice to meet you! [relaxed]What shall we talk about? \
Do not use lists, markdown or emoji.";

/// Clears the processing flag when the turn ends, however it ends
struct ProcessingGuard(Arc<AtomicBool>);

impl ProcessingGuard {
    fn start(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(Arc::clone(flag))
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One conversation with a speaking avatar
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    pipeline: SpeechPipeline,
    log: ChatLog,
    system_prompt: String,
    voice: VoiceParams,
    processing: Arc<AtomicBool>,
}

impl ChatSession {
    #[must_use]
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        pipeline: SpeechPipeline,
        system_prompt: Option<String>,
        voice: VoiceParams,
    ) -> Self {
        Self {
            backend,
            pipeline,
            log: ChatLog::new(),
            system_prompt: system_prompt.unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            voice,
            processing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Send a user message and speak the streamed reply
    ///
    /// Returns the assistant transcript (`[tag] sentence` per spoken line).
    /// Lines keep playing after this returns; see [`idle`](Self::idle).
    ///
    /// # Errors
    ///
    /// Returns error if the chat stream cannot be opened or fails midway.
    /// On a midway failure the sentences spoken so far are kept in the log.
    pub async fn send(&mut self, text: &str) -> Result<String> {
        let _processing = ProcessingGuard::start(&self.processing);

        self.log.push(Message::user(text));
        let messages = self.log.with_system(&self.system_prompt);

        let mut stream = match self.backend.stream_reply(&messages).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "failed to open chat stream");
                return Err(e);
            }
        };

        let mut splitter = SentenceSplitter::new();
        let mut transcript = Vec::new();
        let mut failure = None;

        while let Some(fragment) = stream.next().await {
            match fragment {
                Ok(fragment) => {
                    for sentence in splitter.push(&fragment) {
                        self.speak_sentence(&sentence, &mut transcript).await?;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, spoken = transcript.len(), "chat stream failed");
                    failure = Some(e);
                    break;
                }
            }
        }

        if failure.is_none()
            && let Some(sentence) = splitter.finish()
        {
            self.speak_sentence(&sentence, &mut transcript).await?;
        }

        let reply = transcript.join(" ");
        self.log.push(Message::assistant(reply.clone()));

        match failure {
            Some(e) => Err(e),
            None => Ok(reply),
        }
    }

    async fn speak_sentence(
        &mut self,
        sentence: &TaggedSentence,
        transcript: &mut Vec<String>,
    ) -> Result<()> {
        tracing::debug!(tag = ?sentence.tag, sentence = %sentence.sentence, "sentence ready");
        let screenplay = Screenplay::new(sentence.tag.as_deref(), &sentence.sentence, self.voice);
        self.pipeline
            .speak(screenplay, SpeakCallbacks::none())
            .await?;
        transcript.push(sentence.transcript_line());
        Ok(())
    }

    /// Speak the welcome line, animated only when muted
    ///
    /// # Errors
    ///
    /// Returns error if the pipeline has stopped
    pub async fn introduce(&mut self) -> Result<()> {
        let screenplay = Screenplay::from_text(INTRODUCTION, self.voice);
        self.pipeline
            .speak(
                screenplay,
                SpeakCallbacks::none().on_start(|| tracing::debug!("introduction started")),
            )
            .await
    }

    /// Whether a turn is in progress
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Shared handle on the processing flag, for observers on other tasks
    #[must_use]
    pub fn processing_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.processing)
    }

    #[must_use]
    pub const fn log(&self) -> &ChatLog {
        &self.log
    }

    pub const fn log_mut(&mut self) -> &mut ChatLog {
        &mut self.log
    }

    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Replace the system prompt; `None` restores the default
    pub fn set_system_prompt(&mut self, prompt: Option<String>) {
        self.system_prompt = prompt.unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    }

    pub fn set_voice(&mut self, voice: VoiceParams) {
        self.voice = voice;
    }

    #[must_use]
    pub const fn pipeline(&self) -> &SpeechPipeline {
        &self.pipeline
    }

    pub const fn pipeline_mut(&mut self) -> &mut SpeechPipeline {
        &mut self.pipeline
    }

    /// Wait until every spoken line has finished
    pub async fn idle(&self) {
        self.pipeline.idle().await;
    }

    /// Let queued lines finish and stop the pipeline
    pub async fn shutdown(self) {
        self.pipeline.shutdown().await;
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("messages", &self.log.len())
            .field("processing", &self.is_processing())
            .finish_non_exhaustive()
    }
}
