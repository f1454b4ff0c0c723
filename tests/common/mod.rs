//! Shared test utilities
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use avatar_speech::speech::{AudioBuffer, Synthesizer, Talk, Viewer};
use avatar_speech::{Error, Result, Screenplay};

/// Something observed by a test double
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    FetchStart { message: String, at: Instant },
    FetchEnd { message: String, at: Instant },
    PlayStart { message: String, audio: Option<Vec<u8>>, expression: String, at: Instant },
    PlayEnd { message: String, at: Instant },
    Callback(String),
}

/// Shared, ordered event log
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    /// Messages in the order their playback started
    pub fn play_order(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::PlayStart { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Fetch start times keyed by message
    pub fn fetch_starts(&self) -> Vec<(String, Instant)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::FetchStart { message, at } => Some((message, at)),
                _ => None,
            })
            .collect()
    }

    /// (start, end) playback intervals in order
    pub fn play_intervals(&self) -> Vec<(Instant, Instant)> {
        let mut starts = Vec::new();
        let mut intervals = Vec::new();
        for event in self.events() {
            match event {
                Event::PlayStart { at, .. } => starts.push(at),
                Event::PlayEnd { at, .. } => intervals.push((starts.remove(0), at)),
                _ => {}
            }
        }
        intervals
    }

    /// Callback labels in firing order
    pub fn callbacks(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Callback(label) => Some(label),
                _ => None,
            })
            .collect()
    }
}

/// Viewer that records what it plays and holds each line for a fixed time
pub struct RecordingViewer {
    log: EventLog,
    loaded: bool,
    play_time: Duration,
}

impl RecordingViewer {
    pub fn new(log: &EventLog, play_time: Duration) -> Self {
        Self {
            log: log.clone(),
            loaded: true,
            play_time,
        }
    }

    /// Viewer whose avatar model never loaded
    pub fn unloaded(log: &EventLog) -> Self {
        Self {
            loaded: false,
            ..Self::new(log, Duration::ZERO)
        }
    }
}

#[async_trait]
impl Viewer for RecordingViewer {
    fn is_loaded(&self) -> bool {
        self.loaded
    }

    async fn speak(&mut self, audio: Option<&AudioBuffer>, screenplay: &Screenplay) -> Result<()> {
        self.log.push(Event::PlayStart {
            message: screenplay.message().to_string(),
            audio: audio.map(|a| a.as_bytes().to_vec()),
            expression: screenplay.expression().to_string(),
            at: Instant::now(),
        });
        tokio::time::sleep(self.play_time).await;
        self.log.push(Event::PlayEnd {
            message: screenplay.message().to_string(),
            at: Instant::now(),
        });
        Ok(())
    }
}

/// Synthesizer with per-message latency and failures
///
/// Successful calls return the message bytes as audio.
pub struct ScriptedSynthesizer {
    log: EventLog,
    default_latency: Duration,
    latencies: HashMap<String, Duration>,
    failures: HashSet<String>,
}

impl ScriptedSynthesizer {
    pub fn new(log: &EventLog, default_latency: Duration) -> Self {
        Self {
            log: log.clone(),
            default_latency,
            latencies: HashMap::new(),
            failures: HashSet::new(),
        }
    }

    #[must_use]
    pub fn with_latency(mut self, message: &str, latency: Duration) -> Self {
        self.latencies.insert(message.to_string(), latency);
        self
    }

    #[must_use]
    pub fn failing_on(mut self, message: &str) -> Self {
        self.failures.insert(message.to_string());
        self
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn synthesize(&self, talk: &Talk) -> Result<AudioBuffer> {
        self.log.push(Event::FetchStart {
            message: talk.message.clone(),
            at: Instant::now(),
        });

        let latency = self
            .latencies
            .get(&talk.message)
            .copied()
            .unwrap_or(self.default_latency);
        tokio::time::sleep(latency).await;

        self.log.push(Event::FetchEnd {
            message: talk.message.clone(),
            at: Instant::now(),
        });

        if self.failures.contains(&talk.message) {
            return Err(Error::Synthesis(format!("scripted failure for {}", talk.message)));
        }
        Ok(AudioBuffer::from(talk.message.as_bytes().to_vec()))
    }
}
