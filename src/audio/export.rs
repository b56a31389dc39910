//! Audio export functionality.
//!
//! Renders a compiled plan offline to a WAV file. The plan is played through
//! the regular [`Scheduler`] on a [`VirtualClock`], with a backend that mixes
//! each sound into a buffer at its offset instead of sending it to a device.

use super::engine::SAMPLE_RATE;
use super::tone::{NoiseBurst, ToneSource};
use crate::error::Result as NinkResult;
use crate::playback::{Backend, Plan, Scheduler, Tone, VirtualClock};
use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Buffer size for writing chunks.
const RENDER_BUFFER_SIZE: usize = 4096;

/// Silence appended after the last event.
const TAIL: Duration = Duration::from_millis(500);

/// Backend that mixes sounds into a mono sample buffer.
struct MixdownBackend {
    sample_rate: u32,
    buffer: Mutex<Vec<f32>>,
}

impl MixdownBackend {
    fn new(sample_rate: u32, length: Duration) -> Self {
        let frames = (length.as_secs_f64() * sample_rate as f64).ceil() as usize;
        Self {
            sample_rate,
            buffer: Mutex::new(vec![0.0; frames]),
        }
    }

    fn mix(&self, at: Duration, samples: impl Iterator<Item = f32>) {
        let start = (at.as_secs_f64() * self.sample_rate as f64).round() as usize;
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        for (i, sample) in samples.enumerate() {
            let index = start + i;
            if index >= buffer.len() {
                buffer.resize(index + 1, 0.0);
            }
            buffer[index] += sample;
        }
    }

    fn into_samples(self) -> Vec<f32> {
        self.buffer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for MixdownBackend {
    fn play_tone(&self, tone: Tone, duration: Duration, at: Duration) -> NinkResult<()> {
        let source = ToneSource::new(tone.voice, tone.pitch.frequency, duration, self.sample_rate);
        self.mix(at, source);
        Ok(())
    }

    fn play_error_indicator(&self, duration: Duration, at: Duration) -> NinkResult<()> {
        let burst = NoiseBurst::new(duration, self.sample_rate, at.as_nanos() as u64);
        self.mix(at, burst);
        Ok(())
    }
}

/// Renders a plan to mono samples.
///
/// # Arguments
///
/// * `plan` - Compiled notation
/// * `sample_rate` - Output sample rate in Hz
///
/// # Returns
///
/// Samples covering the whole plan plus a short silent tail
pub fn render(plan: &Plan, sample_rate: u32) -> Vec<f32> {
    let backend = Arc::new(MixdownBackend::new(sample_rate, plan.total + TAIL));

    let mut scheduler = Scheduler::new(VirtualClock::new(), backend.clone());
    scheduler.play(plan);
    scheduler.clock().run_until_idle();
    drop(scheduler);

    match Arc::try_unwrap(backend) {
        Ok(backend) => backend.into_samples(),
        Err(shared) => shared
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone(),
    }
}

/// Exports a plan to a WAV file.
///
/// Writes 16-bit stereo at [`SAMPLE_RATE`] using the built-in voices.
///
/// # Arguments
///
/// * `plan` - Compiled notation
/// * `output_path` - Path for the output WAV file
/// * `progress_callback` - Optional callback for progress updates (0.0 to 1.0)
///
/// # Errors
///
/// Returns error if:
/// - Output file cannot be created
/// - Writing fails
pub fn export_to_wav<P, F>(plan: &Plan, output_path: P, mut progress_callback: Option<F>) -> Result<()>
where
    P: AsRef<Path>,
    F: FnMut(f32),
{
    let samples = render(plan, SAMPLE_RATE);

    let spec = WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(output_path.as_ref(), spec).with_context(|| {
        format!(
            "Failed to create output WAV file: {}",
            output_path.as_ref().display()
        )
    })?;

    let total = samples.len();
    for (chunk_index, chunk) in samples.chunks(RENDER_BUFFER_SIZE).enumerate() {
        for &sample in chunk {
            // Convert f32 (-1.0 to 1.0) to i16, same on both channels
            let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(value)?;
            writer.write_sample(value)?;
        }

        if let Some(ref mut callback) = progress_callback {
            let written = ((chunk_index + 1) * RENDER_BUFFER_SIZE).min(total);
            callback(written as f32 / total.max(1) as f32);
        }
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    tracing::info!(
        path = %output_path.as_ref().display(),
        seconds = total as f64 / SAMPLE_RATE as f64,
        "exported WAV"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::notation::RangeMode;
    use crate::playback::compile;

    const SR: u32 = 8000;

    fn energy(samples: &[f32]) -> f32 {
        samples.iter().map(|s| s * s).sum()
    }

    #[test]
    fn test_render_places_notes_at_offsets() {
        let config = SessionConfig {
            tempo: 60.0,
            ..Default::default()
        };
        let plan = compile("D.D", &config).unwrap();
        let samples = render(&plan, SR);

        // 3 beats of one second plus the tail
        assert_eq!(samples.len(), 3 * SR as usize + SR as usize / 2);
        assert!(energy(&samples[..SR as usize]) > 1.0);
        assert_eq!(energy(&samples[SR as usize..2 * SR as usize]), 0.0);
        assert!(energy(&samples[2 * SR as usize..3 * SR as usize]) > 1.0);
    }

    #[test]
    fn test_render_error_indicator() {
        let config = SessionConfig {
            range_mode: RangeMode::Normal,
            ..Default::default()
        };
        let plan = compile("//D", &config).unwrap();
        let samples = render(&plan, SR);
        assert!(energy(&samples[..SR as usize / 2]) > 0.1);
    }

    #[test]
    fn test_export_writes_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("melody.wav");
        let plan = compile("::D:R_M", &SessionConfig::default()).unwrap();

        let mut last_progress = 0.0;
        export_to_wav(&plan, &path, Some(|p: f32| last_progress = p)).unwrap();
        assert_eq!(last_progress, 1.0);

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, SAMPLE_RATE);
        // 0.125 + 0.25 + 1.0 seconds of notes plus the tail
        let expected_frames = ((1.375 + 0.5) * SAMPLE_RATE as f64).ceil() as u32;
        assert_eq!(reader.duration(), expected_frames);
    }

    #[test]
    fn test_export_empty_plan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        export_to_wav(&Plan::default(), &path, None::<fn(f32)>).unwrap();
        assert!(path.exists());
    }
}
