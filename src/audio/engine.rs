//! Live audio output.
//!
//! Opens the default output device through rodio. With a SoundFont loaded,
//! tones are played by a rustysynth synthesizer on one MIDI channel per
//! voice. Without one, the built-in [`ToneSource`] voices are used. The
//! error indicator is always a [`NoiseBurst`].

use super::tone::{NoiseBurst, ToneSource};
use crate::config::SessionConfig;
use crate::error::{NinkError, Result as NinkResult};
use crate::notation::Voice;
use crate::playback::{Backend, Tone};
use anyhow::{Context, Result};
use rodio::{OutputStream, OutputStreamHandle, Source};
use rustysynth::{SoundFont, Synthesizer, SynthesizerSettings};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sample rate for audio synthesis (44.1 kHz standard).
pub const SAMPLE_RATE: u32 = 44100;

/// Audio buffer size for low-latency playback.
/// Smaller = lower latency but higher CPU usage.
const BUFFER_SIZE: usize = 256;

/// Note velocity for SoundFont tones.
const VELOCITY: i32 = 100;

/// MIDI channel a voice plays on.
pub fn channel(voice: Voice) -> u8 {
    match voice {
        Voice::Primary => 0,
        Voice::Secondary => 1,
    }
}

/// A note-off due once the synthesizer has rendered `frame` frames.
#[derive(Debug, Clone, Copy)]
struct Release {
    frame: u64,
    channel: i32,
    key: i32,
}

/// State shared between the engine and the audio thread.
struct SharedState {
    /// Frames rendered so far by the synthesizer source.
    rendered_frames: AtomicU64,
    /// Note-offs not yet sent.
    releases: Mutex<Vec<Release>>,
}

/// Audio source that generates samples from the synthesizer.
/// Implements rodio's Source trait for playback.
struct SynthSource {
    /// The synthesizer instance.
    synth: Arc<Mutex<Synthesizer>>,
    /// Shared frame counter and pending releases.
    state: Arc<SharedState>,
    /// Left channel buffer.
    left_buf: Vec<f32>,
    /// Right channel buffer.
    right_buf: Vec<f32>,
    /// Current position in the buffer.
    buf_pos: usize,
    /// Current channel (0 = left, 1 = right).
    channel: usize,
}

impl SynthSource {
    fn new(synth: Arc<Mutex<Synthesizer>>, state: Arc<SharedState>) -> Self {
        Self {
            synth,
            state,
            left_buf: vec![0.0; BUFFER_SIZE],
            right_buf: vec![0.0; BUFFER_SIZE],
            buf_pos: BUFFER_SIZE, // Start at end to trigger first render
            channel: 0,
        }
    }

    /// Sends every note-off that is due before the next buffer.
    fn release_due(&self, synth: &mut Synthesizer) {
        let rendered = self.state.rendered_frames.load(Ordering::Acquire);
        if let Ok(mut releases) = self.state.releases.lock() {
            releases.retain(|release| {
                if release.frame <= rendered {
                    synth.note_off(release.channel, release.key);
                    false
                } else {
                    true
                }
            });
        }
    }
}

impl Iterator for SynthSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.buf_pos >= BUFFER_SIZE {
            if let Ok(mut synth) = self.synth.lock() {
                self.release_due(&mut synth);
                synth.render(&mut self.left_buf, &mut self.right_buf);
            } else {
                // Only fill with silence if we can't get the lock
                self.left_buf.fill(0.0);
                self.right_buf.fill(0.0);
            }
            self.state
                .rendered_frames
                .fetch_add(BUFFER_SIZE as u64, Ordering::AcqRel);
            self.buf_pos = 0;
        }

        // Interleave stereo samples: L, R, L, R, ...
        let sample = if self.channel == 0 {
            self.left_buf[self.buf_pos]
        } else {
            self.right_buf[self.buf_pos]
        };

        self.channel = 1 - self.channel;
        if self.channel == 0 {
            self.buf_pos += 1;
        }

        Some(sample)
    }
}

impl Source for SynthSource {
    fn current_frame_len(&self) -> Option<usize> {
        None // Continuous stream
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        None // Infinite stream
    }
}

/// SoundFont playback shared with the audio thread.
#[derive(Clone)]
struct SoundFontVoices {
    synth: Arc<Mutex<Synthesizer>>,
    state: Arc<SharedState>,
}

/// Cloneable handle to the output device. This is the [`Backend`] the
/// scheduler talks to; it can be moved to the clock thread.
#[derive(Clone)]
pub struct AudioOutput {
    stream_handle: OutputStreamHandle,
    soundfont: Option<SoundFontVoices>,
}

impl AudioOutput {
    /// Whether tones come from a SoundFont.
    pub fn uses_soundfont(&self) -> bool {
        self.soundfont.is_some()
    }

    /// Stops all playing notes.
    ///
    /// # Arguments
    ///
    /// * `immediate` - If true, notes stop immediately without release
    pub fn all_notes_off(&self, immediate: bool) {
        if let Some(sf) = &self.soundfont {
            if let Ok(mut synth) = sf.synth.lock() {
                synth.note_off_all(immediate);
            }
            if let Ok(mut releases) = sf.state.releases.lock() {
                releases.clear();
            }
        }
    }
}

impl Backend for AudioOutput {
    fn play_tone(&self, tone: Tone, duration: Duration, _at: Duration) -> NinkResult<()> {
        let Some(sf) = &self.soundfont else {
            let source = ToneSource::new(tone.voice, tone.pitch.frequency, duration, SAMPLE_RATE);
            return self
                .stream_handle
                .play_raw(source)
                .map_err(|e| NinkError::Backend(e.to_string()));
        };

        let channel = channel(tone.voice) as i32;
        let key = tone.pitch.midi;
        if !(0..=127).contains(&key) {
            return Err(NinkError::Backend(format!("note {} outside MIDI range", key)));
        }

        let mut synth = sf
            .synth
            .lock()
            .map_err(|_| NinkError::Backend("synthesizer lock poisoned".to_string()))?;
        synth.note_on(channel, key, VELOCITY);

        let frame = sf.state.rendered_frames.load(Ordering::Acquire)
            + (duration.as_secs_f64() * SAMPLE_RATE as f64) as u64;
        sf.state
            .releases
            .lock()
            .map_err(|_| NinkError::Backend("release queue lock poisoned".to_string()))?
            .push(Release {
                frame,
                channel,
                key,
            });
        Ok(())
    }

    fn play_error_indicator(&self, duration: Duration, at: Duration) -> NinkResult<()> {
        let burst = NoiseBurst::new(duration, SAMPLE_RATE, at.as_nanos() as u64);
        self.stream_handle
            .play_raw(burst)
            .map_err(|e| NinkError::Backend(e.to_string()))
    }
}

/// The live audio engine.
///
/// Owns the output stream, which must stay alive (and on the thread that
/// created it) for as long as anything should be heard.
pub struct AudioEngine {
    /// Audio output stream (must be kept alive).
    _stream: OutputStream,
    output: AudioOutput,
}

impl AudioEngine {
    /// Opens the default output device.
    ///
    /// # Arguments
    ///
    /// * `soundfont_path` - Optional SoundFont file (.sf2) for the voices
    /// * `config` - Session configuration, for the voice programs
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The SoundFont file cannot be read
    /// - The SoundFont is invalid
    /// - Audio output cannot be initialized
    pub fn new(soundfont_path: Option<&Path>, config: &SessionConfig) -> Result<Self> {
        let (stream, stream_handle) =
            OutputStream::try_default().context("Failed to open audio output")?;

        let soundfont = match soundfont_path {
            Some(path) => {
                let voices = Self::load_soundfont(path, config)?;
                let source = SynthSource::new(Arc::clone(&voices.synth), Arc::clone(&voices.state));
                stream_handle
                    .play_raw(source)
                    .context("Failed to start audio playback")?;
                tracing::info!(soundfont = %path.display(), "loaded SoundFont");
                Some(voices)
            }
            None => None,
        };

        Ok(Self {
            _stream: stream,
            output: AudioOutput {
                stream_handle,
                soundfont,
            },
        })
    }

    fn load_soundfont(path: &Path, config: &SessionConfig) -> Result<SoundFontVoices> {
        let mut file = BufReader::new(
            File::open(path)
                .with_context(|| format!("Failed to open SoundFont: {}", path.display()))?,
        );
        let soundfont = Arc::new(
            SoundFont::new(&mut file)
                .map_err(|e| anyhow::anyhow!("Failed to load SoundFont: {:?}", e))?,
        );

        let settings = SynthesizerSettings::new(SAMPLE_RATE as i32);
        let mut synth = Synthesizer::new(&soundfont, &settings)
            .map_err(|e| anyhow::anyhow!("Failed to create synthesizer: {:?}", e))?;

        for voice in [Voice::Primary, Voice::Secondary] {
            // Program change is MIDI command 0xC0 (192)
            synth.process_midi_message(channel(voice) as i32, 0xC0, config.program(voice) as i32, 0);
        }

        Ok(SoundFontVoices {
            synth: Arc::new(Mutex::new(synth)),
            state: Arc::new(SharedState {
                rendered_frames: AtomicU64::new(0),
                releases: Mutex::new(Vec::new()),
            }),
        })
    }

    /// A backend handle for the scheduler.
    pub fn output(&self) -> AudioOutput {
        self.output.clone()
    }

    /// Silences everything that is currently sounding.
    pub fn silence(&self) {
        self.output.all_notes_off(true);
    }
}
