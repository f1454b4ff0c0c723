//! Speech pipeline integration tests
//!
//! Runs the scheduler against scripted backends on a paused clock

use std::sync::Arc;
use std::time::Duration;

use avatar_speech::speech::{
    AnimationQueue, PlaybackSequencer, SchedulerConfig, SpeakCallbacks, SpeechScheduler,
};
use avatar_speech::{Screenplay, SpeechPipeline, VoiceParams};

mod common;
use common::{Event, EventLog, RecordingViewer, ScriptedSynthesizer};

const PLAY_TIME: Duration = Duration::from_millis(500);

fn line(text: &str) -> Screenplay {
    Screenplay::from_text(text, VoiceParams::default())
}

fn scheduler(log: &EventLog, synth: ScriptedSynthesizer, play_time: Duration) -> SpeechScheduler {
    SpeechScheduler::new(
        Arc::new(synth),
        PlaybackSequencer::new(RecordingViewer::new(log, play_time)),
        SchedulerConfig::default(),
    )
}

fn labelled(log: &EventLog, label: &str) -> SpeakCallbacks {
    let (start_log, end_log) = (log.clone(), log.clone());
    let (start, end) = (format!("start {label}"), format!("end {label}"));
    SpeakCallbacks::none()
        .on_start(move || start_log.push(Event::Callback(start)))
        .on_complete(move || end_log.push(Event::Callback(end)))
}

#[tokio::test(start_paused = true)]
async fn test_playback_follows_schedule_order_under_variable_latency() {
    let log = EventLog::default();
    let synth = ScriptedSynthesizer::new(&log, Duration::from_millis(50))
        .with_latency("First.", Duration::from_secs(3))
        .with_latency("Second.", Duration::from_millis(10))
        .with_latency("Third.", Duration::from_secs(1));
    let mut scheduler = scheduler(&log, synth, PLAY_TIME);

    for (i, text) in ["First.", "Second.", "Third."].into_iter().enumerate() {
        let seq = scheduler.schedule(line(text), SpeakCallbacks::none()).await.unwrap();
        assert_eq!(seq, i as u64);
    }
    scheduler.idle().await;

    assert_eq!(log.play_order(), vec!["First.", "Second.", "Third."]);

    // Never two lines on the viewer at once
    let intervals = log.play_intervals();
    assert_eq!(intervals.len(), 3);
    for pair in intervals.windows(2) {
        assert!(pair[1].0 >= pair[0].1, "playback overlapped: {pair:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_fetches_are_spaced_by_throttle() {
    let log = EventLog::default();
    let latency = Duration::from_millis(200);
    let mut scheduler = scheduler(&log, ScriptedSynthesizer::new(&log, latency), Duration::ZERO);

    for text in ["One.", "Two.", "Three.", "Four."] {
        scheduler.schedule(line(text), SpeakCallbacks::none()).await.unwrap();
    }
    scheduler.idle().await;

    let starts = log.fetch_starts();
    assert_eq!(starts.len(), 4);
    for pair in starts.windows(2) {
        let gap = pair[1].1 - pair[0].1;
        // Interval counts from the end of the previous call
        assert!(gap >= latency + Duration::from_millis(1000), "gap too short: {gap:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_fetch_runs_ahead_of_playback() {
    let log = EventLog::default();
    let synth = ScriptedSynthesizer::new(&log, Duration::from_millis(100));
    let mut scheduler = scheduler(&log, synth, Duration::from_secs(10));

    scheduler.schedule(line("Long line."), SpeakCallbacks::none()).await.unwrap();
    scheduler.schedule(line("Next line."), SpeakCallbacks::none()).await.unwrap();
    scheduler.idle().await;

    let events = log.events();
    let second_fetch = events
        .iter()
        .position(|e| matches!(e, Event::FetchStart { message, .. } if message == "Next line."))
        .unwrap();
    let first_end = events
        .iter()
        .position(|e| matches!(e, Event::PlayEnd { message, .. } if message == "Long line."))
        .unwrap();
    assert!(second_fetch < first_end, "second fetch waited for playback");
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_keeps_its_slot() {
    let log = EventLog::default();
    let synth = ScriptedSynthesizer::new(&log, Duration::from_millis(100)).failing_on("Broken.");
    let mut scheduler = scheduler(&log, synth, PLAY_TIME);

    for text in ["Before.", "Broken.", "After."] {
        scheduler.schedule(line(text), labelled(&log, text)).await.unwrap();
    }
    scheduler.idle().await;

    let plays: Vec<(String, bool)> = log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::PlayStart { message, audio, .. } => Some((message, audio.is_some())),
            _ => None,
        })
        .collect();
    assert_eq!(
        plays,
        vec![
            ("Before.".to_string(), true),
            ("Broken.".to_string(), false),
            ("After.".to_string(), true),
        ]
    );

    assert_eq!(
        log.callbacks(),
        vec![
            "start Before.", "end Before.", "start Broken.", "end Broken.", "start After.",
            "end After.",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_on_start_fires_right_before_playback() {
    let log = EventLog::default();
    let mut scheduler = scheduler(
        &log,
        ScriptedSynthesizer::new(&log, Duration::from_millis(100)),
        PLAY_TIME,
    );

    scheduler.schedule(line("Hello."), labelled(&log, "hello")).await.unwrap();
    scheduler.idle().await;

    let kinds: Vec<&'static str> = log
        .events()
        .iter()
        .map(|e| match e {
            Event::FetchStart { .. } => "fetch",
            Event::FetchEnd { .. } => "fetched",
            Event::Callback(label) if label.starts_with("start") => "on_start",
            Event::Callback(_) => "on_complete",
            Event::PlayStart { .. } => "play",
            Event::PlayEnd { .. } => "played",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["fetch", "fetched", "on_start", "play", "played", "on_complete"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_local_audio_skips_synthesis() {
    let log = EventLog::default();
    let mut scheduler = scheduler(
        &log,
        ScriptedSynthesizer::new(&log, Duration::from_millis(100)),
        PLAY_TIME,
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greeting.wav");
    std::fs::write(&path, b"RIFF....WAVEfmt ").unwrap();

    scheduler
        .schedule_local(&path, line("Recorded."), SpeakCallbacks::none())
        .await
        .unwrap();
    scheduler
        .schedule_local(dir.path().join("missing.mp3"), line("Missing."), labelled(&log, "missing"))
        .await
        .unwrap();
    scheduler.schedule(line("Synthesized."), SpeakCallbacks::none()).await.unwrap();
    scheduler.idle().await;

    let events = log.events();
    let audio_of = |name: &str| {
        events.iter().find_map(|e| match e {
            Event::PlayStart { message, audio, .. } if message == name => Some(audio.clone()),
            _ => None,
        })
    };

    assert_eq!(audio_of("Recorded."), Some(Some(b"RIFF....WAVEfmt ".to_vec())));
    assert_eq!(audio_of("Missing."), Some(None));
    assert_eq!(audio_of("Synthesized."), Some(Some(b"Synthesized.".to_vec())));
    assert_eq!(log.callbacks(), vec!["start missing", "end missing"]);

    // Only the synthesized line reached the backend
    let fetched: Vec<String> = log.fetch_starts().into_iter().map(|(m, _)| m).collect();
    assert_eq!(fetched, vec!["Synthesized."]);
    assert_eq!(log.play_order(), vec!["Recorded.", "Missing.", "Synthesized."]);
}

#[tokio::test(start_paused = true)]
async fn test_unloaded_viewer_resolves_without_playing() {
    let log = EventLog::default();
    let mut scheduler = SpeechScheduler::new(
        Arc::new(ScriptedSynthesizer::new(&log, Duration::from_millis(100))),
        PlaybackSequencer::new(RecordingViewer::unloaded(&log)),
        SchedulerConfig::default(),
    );

    scheduler.schedule(line("Nobody hears this."), labelled(&log, "a")).await.unwrap();
    scheduler.idle().await;

    assert!(log.play_order().is_empty());
    assert_eq!(log.callbacks(), vec!["start a", "end a"]);
    assert_eq!(scheduler.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_queued_lines() {
    let log = EventLog::default();
    let mut scheduler = scheduler(
        &log,
        ScriptedSynthesizer::new(&log, Duration::from_millis(100)),
        PLAY_TIME,
    );

    for text in ["A.", "B.", "C."] {
        scheduler.schedule(line(text), SpeakCallbacks::none()).await.unwrap();
    }
    assert_eq!(scheduler.scheduled(), 3);
    scheduler.shutdown().await;

    assert_eq!(log.play_order(), vec!["A.", "B.", "C."]);
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_applies_back_pressure() {
    let log = EventLog::default();
    let mut scheduler = SpeechScheduler::new(
        Arc::new(ScriptedSynthesizer::new(&log, Duration::from_millis(100))),
        PlaybackSequencer::new(RecordingViewer::new(&log, PLAY_TIME)),
        SchedulerConfig {
            queue_capacity: 1,
            ..SchedulerConfig::default()
        },
    );

    for i in 0..5 {
        scheduler
            .schedule(line(&format!("Line {i}.")), SpeakCallbacks::none())
            .await
            .unwrap();
    }
    scheduler.idle().await;

    assert_eq!(
        log.play_order(),
        vec!["Line 0.", "Line 1.", "Line 2.", "Line 3.", "Line 4."]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_schedule_leaves_no_trace() {
    let log = EventLog::default();
    let mut scheduler = SpeechScheduler::new(
        Arc::new(ScriptedSynthesizer::new(&log, Duration::from_millis(100))),
        PlaybackSequencer::new(RecordingViewer::new(&log, Duration::from_secs(10))),
        SchedulerConfig {
            queue_capacity: 1,
            ..SchedulerConfig::default()
        },
    );

    assert_eq!(scheduler.schedule(line("A."), SpeakCallbacks::none()).await.unwrap(), 0);
    assert_eq!(scheduler.schedule(line("B."), SpeakCallbacks::none()).await.unwrap(), 1);
    tokio::time::sleep(Duration::from_secs(2)).await;

    // A is playing and B fills the playback queue, so C waits and is dropped
    let cancelled = tokio::time::timeout(
        Duration::from_secs(1),
        scheduler.schedule(line("C."), labelled(&log, "C")),
    )
    .await;
    assert!(cancelled.is_err());
    assert_eq!(scheduler.scheduled(), 2);
    assert_eq!(scheduler.pending(), 2);

    let seq = scheduler.schedule(line("D."), SpeakCallbacks::none()).await.unwrap();
    assert_eq!(seq, 2);

    tokio::time::timeout(Duration::from_secs(300), scheduler.idle())
        .await
        .expect("scheduler never went idle");

    assert_eq!(log.play_order(), vec!["A.", "B.", "D."]);
    let fetched: Vec<String> = log.fetch_starts().into_iter().map(|(m, _)| m).collect();
    assert_eq!(fetched, vec!["A.", "B.", "D."]);
    assert!(log.callbacks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_animation_shares_the_viewer_with_speech() {
    let log = EventLog::default();
    let sequencer = PlaybackSequencer::new(RecordingViewer::new(&log, PLAY_TIME));
    let mut scheduler = SpeechScheduler::new(
        Arc::new(ScriptedSynthesizer::new(&log, Duration::from_millis(100))),
        sequencer.clone(),
        SchedulerConfig::default(),
    );
    let animation = AnimationQueue::new(sequencer);

    scheduler.schedule(line("Spoken one."), SpeakCallbacks::none()).await.unwrap();
    scheduler.schedule(line("Spoken two."), SpeakCallbacks::none()).await.unwrap();
    animation.enqueue_all([line("Animated one."), line("Animated two.")]);

    scheduler.idle().await;
    animation.idle().await;

    let order = log.play_order();
    assert_eq!(order.len(), 4);
    let position = |m: &str| order.iter().position(|o| o == m).unwrap();
    assert!(position("Spoken one.") < position("Spoken two."));
    assert!(position("Animated one.") < position("Animated two."));

    for pair in log.play_intervals().windows(2) {
        assert!(pair[1].0 >= pair[0].1, "playback overlapped: {pair:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_pipeline_speaks_segmented_text() {
    let log = EventLog::default();
    let mut pipeline = SpeechPipeline::new(
        Arc::new(ScriptedSynthesizer::new(&log, Duration::from_millis(100))),
        RecordingViewer::new(&log, PLAY_TIME),
        SchedulerConfig::default(),
    );

    let count = pipeline
        .speak_text("[happy]Hello there.\n「」\n[sad]See you soon!", VoiceParams::default())
        .await
        .unwrap();
    assert_eq!(count, 2);
    pipeline.idle().await;

    let plays: Vec<(String, String)> = log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::PlayStart { message, expression, .. } => Some((message, expression)),
            _ => None,
        })
        .collect();
    assert_eq!(
        plays,
        vec![
            ("Hello there.".to_string(), "happy".to_string()),
            ("See you soon!".to_string(), "sad".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_muted_pipeline_never_calls_the_backend() {
    let log = EventLog::default();
    let mut pipeline = SpeechPipeline::new(
        Arc::new(ScriptedSynthesizer::new(&log, Duration::from_millis(100))),
        RecordingViewer::new(&log, PLAY_TIME),
        SchedulerConfig::default(),
    );
    pipeline.set_muted(true);

    pipeline.speak(line("Quiet one."), SpeakCallbacks::none()).await.unwrap();
    pipeline.speak(line("Quiet two."), SpeakCallbacks::none()).await.unwrap();
    pipeline.idle().await;

    assert!(log.fetch_starts().is_empty());
    assert_eq!(log.play_order(), vec!["Quiet one.", "Quiet two."]);
    assert!(log.events().iter().all(|e| !matches!(
        e,
        Event::PlayStart { audio: Some(_), .. }
    )));

    pipeline.shutdown().await;
}
