//! Built-in tone and noise sources.
//!
//! Used when no SoundFont is loaded and for WAV export. Both sources are
//! finite mono streams that implement rodio's [`Source`], so they can be
//! handed straight to an output stream or drained into a buffer.

use crate::notation::Voice;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use rodio::Source;
use std::f32::consts::TAU;
use std::time::Duration;

/// Attack time that keeps tone onsets from clicking.
const ATTACK_SECS: f32 = 0.005;

/// Bell partials as (frequency ratio, amplitude).
const BELL_PARTIALS: [(f32, f32); 4] = [(1.0, 1.0), (2.0, 0.45), (2.76, 0.3), (5.4, 0.12)];

const BELL_GAIN: f32 = 0.22;
const WHISTLE_GAIN: f32 = 0.3;
const VIBRATO_HZ: f32 = 5.5;
const VIBRATO_DEPTH: f32 = 0.006;

/// Starting and ending gain of the error burst.
const NOISE_START_GAIN: f32 = 0.3;
const NOISE_END_GAIN: f32 = 0.01;

fn frames(duration: Duration, sample_rate: u32) -> u64 {
    (duration.as_secs_f64() * sample_rate as f64).round() as u64
}

/// A single pitched note in the timbre of a voice.
///
/// The primary voice is a bell: inharmonic partials with an exponential
/// decay. The secondary voice is a whistle: a sine with light vibrato that
/// fades out linearly.
#[derive(Debug, Clone)]
pub struct ToneSource {
    voice: Voice,
    frequency: f32,
    sample_rate: u32,
    position: u64,
    length: u64,
    phase: f32,
}

impl ToneSource {
    pub fn new(voice: Voice, frequency: f64, duration: Duration, sample_rate: u32) -> Self {
        Self {
            voice,
            frequency: frequency as f32,
            sample_rate,
            position: 0,
            length: frames(duration, sample_rate),
            phase: 0.0,
        }
    }

    fn envelope(&self, t: f32, progress: f32) -> f32 {
        let attack = (t / ATTACK_SECS).min(1.0);
        match self.voice {
            Voice::Primary => attack * (-4.0 * progress).exp() * (1.0 - progress),
            Voice::Secondary => attack * (1.0 - progress),
        }
    }
}

impl Iterator for ToneSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= self.length {
            return None;
        }

        let sr = self.sample_rate as f32;
        let t = self.position as f32 / sr;
        let progress = self.position as f32 / self.length as f32;
        let envelope = self.envelope(t, progress);

        let sample = match self.voice {
            Voice::Primary => {
                BELL_PARTIALS
                    .iter()
                    .map(|(ratio, amp)| amp * (TAU * self.frequency * ratio * t).sin())
                    .sum::<f32>()
                    * BELL_GAIN
            }
            Voice::Secondary => {
                let vibrato = 1.0 + VIBRATO_DEPTH * (TAU * VIBRATO_HZ * t).sin();
                self.phase = (self.phase + TAU * self.frequency * vibrato / sr) % TAU;
                self.phase.sin() * WHISTLE_GAIN
            }
        };

        self.position += 1;
        Some(sample * envelope)
    }
}

impl Source for ToneSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some((self.length - self.position) as usize)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(
            self.length as f64 / self.sample_rate as f64,
        ))
    }
}

/// White noise with an exponentially falling gain, the audible error indicator.
#[derive(Debug, Clone)]
pub struct NoiseBurst {
    rng: Pcg32,
    sample_rate: u32,
    position: u64,
    length: u64,
}

impl NoiseBurst {
    /// Creates a burst. The same seed always gives the same samples.
    pub fn new(duration: Duration, sample_rate: u32, seed: u64) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed),
            sample_rate,
            position: 0,
            length: frames(duration, sample_rate),
        }
    }
}

impl Iterator for NoiseBurst {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= self.length {
            return None;
        }
        let progress = self.position as f32 / self.length as f32;
        let gain = NOISE_START_GAIN * (NOISE_END_GAIN / NOISE_START_GAIN).powf(progress);
        self.position += 1;
        Some(self.rng.gen_range(-1.0f32..1.0) * gain)
    }
}

impl Source for NoiseBurst {
    fn current_frame_len(&self) -> Option<usize> {
        Some((self.length - self.position) as usize)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(
            self.length as f64 / self.sample_rate as f64,
        ))
    }
}
