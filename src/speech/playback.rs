//! Audio playback to speakers

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::screenplay::Screenplay;
use super::synthesis::{AudioBuffer, AudioFormat};
use super::viewer::{Viewer, speaking_duration};
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Viewer that plays synthesized audio on the default output device
///
/// Lines without audio are held for their estimated speaking time so the
/// expression still shows for a natural duration.
pub struct SpeakerViewer {
    config: StreamConfig,
    chars_per_second: f64,
}

impl SpeakerViewer {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new(chars_per_second: f64) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            config,
            chars_per_second,
        })
    }
}

#[async_trait]
impl Viewer for SpeakerViewer {
    fn is_loaded(&self) -> bool {
        true
    }

    async fn speak(&mut self, audio: Option<&AudioBuffer>, screenplay: &Screenplay) -> Result<()> {
        tracing::info!(
            expression = %screenplay.expression(),
            message = screenplay.message(),
            "speaking line"
        );

        let Some(audio) = audio else {
            tokio::time::sleep(speaking_duration(screenplay.message(), self.chars_per_second))
                .await;
            return Ok(());
        };

        let samples = match audio.format() {
            AudioFormat::Mp3 => decode_mp3(audio.as_bytes())?,
            AudioFormat::Wav => decode_wav(audio.as_bytes())?,
        };

        let config = self.config.clone();
        tokio::task::spawn_blocking(move || play_samples_blocking(&config, samples))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}

/// Play mono samples on the default device, blocking until they are done
#[allow(clippy::needless_pass_by_value)]
fn play_samples_blocking(config: &StreamConfig, samples: Vec<f32>) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let channels = usize::from(config.channels.max(1));
    let sample_count = samples.len();
    let cursor = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = mpsc::sync_channel::<()>(1);

    let stream_cursor = Arc::clone(&cursor);
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let pos = stream_cursor.fetch_add(1, Ordering::Relaxed);
                    let sample = samples.get(pos).copied().unwrap_or(0.0);
                    frame.fill(sample);
                }
                if stream_cursor.load(Ordering::Relaxed) >= samples.len() {
                    // Full buffer means the waiter was already told
                    let _ = done_tx.try_send(());
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
    let deadline = Duration::from_millis(duration_ms + 500);
    if done_rx.recv_timeout(deadline).is_err() {
        tracing::warn!(
            played = cursor.load(Ordering::Relaxed).min(sample_count),
            samples = sample_count,
            "playback did not finish in time"
        );
    }

    // Let the device drain its last buffer
    std::thread::sleep(Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = sample_count, "playback complete");

    Ok(())
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut source_rate = PLAYBACK_SAMPLE_RATE;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                source_rate = u32::try_from(frame.sample_rate).unwrap_or(PLAYBACK_SAMPLE_RATE);
                let frame_samples = frame.data.chunks(frame.channels.max(1)).map(|chunk| {
                    #[allow(clippy::cast_precision_loss)]
                    let sum: f32 = chunk.iter().map(|&s| f32::from(s) / 32768.0).sum();
                    sum / chunk.len() as f32
                });
                samples.extend(frame_samples);
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    resample(&samples, source_rate)
}

/// Decode WAV bytes (as returned by Coqui) to mono f32 samples
fn decode_wav(wav_data: &[u8]) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::new(Cursor::new(wav_data))
        .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?,
        hound::SampleFormat::Int => {
            #[allow(clippy::cast_precision_loss)]
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?
        }
    };

    #[allow(clippy::cast_precision_loss)]
    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    resample(&mono, spec.sample_rate)
}

/// Resample mono audio to the playback rate using rubato
///
/// The last partial chunk is zero-padded and the output trimmed back to the
/// expected length, so trailing speech is not cut off.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn resample(samples: &[f32], from_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == PLAYBACK_SAMPLE_RATE || from_rate == 0 || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler = FftFixedIn::<f64>::new(
        from_rate as usize,
        PLAYBACK_SAMPLE_RATE as usize,
        chunk_size,
        sub_chunks,
        1,
    )
    .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output = Vec::new();

    for chunk in input.chunks(chunk_size) {
        let mut block = chunk.to_vec();
        block.resize(chunk_size, 0.0);
        let result = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    let expected =
        (samples.len() as f64 * f64::from(PLAYBACK_SAMPLE_RATE) / f64::from(from_rate)) as usize;
    output.truncate(expected);

    Ok(output.iter().map(|&s| s as f32).collect())
}
