//! Compiling notation into a timed schedule.
//!
//! A [`Plan`] is the complete, immutable list of what should sound and when,
//! built before anything is handed to a clock. Configuration errors surface
//! here, so a malformed request never produces a partial schedule.

use crate::config::{SessionConfig, Voicing};
use crate::error::Result;
use crate::notation::{
    resolve, tokenize_with, validate, ControlMarker, Diagnostic, Payload, ResolvedPitch, Token,
    Validation, Voice,
};
use std::time::Duration;

/// A pitch to sound on a voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub voice: Voice,
    pub pitch: ResolvedPitch,
}

/// Why an entry sounds as an error indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCause {
    OutOfRange,
    DisallowedOctaveExtension(ControlMarker),
}

/// What happens at a schedule entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    Tone(Tone),
    ErrorIndicator(ErrorCause),
    Rest,
}

/// One token placed on the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    /// Time from session start.
    pub offset: Duration,
    pub duration: Duration,
    pub token: Token,
    pub kind: EventKind,
}

/// A compiled notation string.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plan {
    pub entries: Vec<ScheduleEntry>,
    pub diagnostics: Vec<Diagnostic>,
    /// Offset at which the last entry ends.
    pub total: Duration,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that make a sound (tones and error indicators).
    pub fn audible(&self) -> impl Iterator<Item = &ScheduleEntry> {
        self.entries
            .iter()
            .filter(|entry| !matches!(entry.kind, EventKind::Rest))
    }
}

/// Compiles notation under a session configuration.
///
/// # Arguments
///
/// * `input` - Notation string
/// * `config` - Tempo, tonal base, range mode and voices
///
/// # Returns
///
/// The full schedule with every recoverable problem listed in `diagnostics`
///
/// # Errors
///
/// Returns error if a note name is malformed or the tempo is invalid. Nothing
/// is scheduled in that case.
pub fn compile(input: &str, config: &SessionConfig) -> Result<Plan> {
    let beat = config.beat_duration()?;
    let voicing = config.voicing()?;

    let tokenization = tokenize_with(input, config.range_mode, config.spaces);
    let mut plan = schedule_tokens(&tokenization.tokens, &voicing, beat);

    let mut diagnostics = tokenization.diagnostics;
    diagnostics.append(&mut plan.diagnostics);
    diagnostics.sort_by_key(position);
    plan.diagnostics = diagnostics;

    tracing::debug!(
        entries = plan.len(),
        diagnostics = plan.diagnostics.len(),
        total_secs = plan.total.as_secs_f64(),
        "compiled notation"
    );
    Ok(plan)
}

/// Places tokens on the timeline, resolving and validating each note.
///
/// Every token advances the running offset by its own length, whether it is
/// a rest, a tone or an error indicator.
pub fn schedule_tokens(tokens: &[Token], voicing: &Voicing, beat: Duration) -> Plan {
    let beat_secs = beat.as_secs_f64();
    let mut beats = 0.0f64;
    let mut plan = Plan::default();

    for token in tokens {
        let multiplier = token.duration.multiplier();
        let offset = Duration::from_secs_f64(beats * beat_secs);
        let duration = Duration::from_secs_f64(multiplier * beat_secs);

        let kind = match (token.payload, token.rejected_marker) {
            (Payload::Rest, _) => EventKind::Rest,
            (Payload::Note(_), Some(marker)) => {
                EventKind::ErrorIndicator(ErrorCause::DisallowedOctaveExtension(marker))
            }
            (Payload::Note(symbol), None) => {
                let setup = voicing.voice(token.voice);
                let pitch = resolve(&setup.natural, symbol, token.octave_offset)
                    .transposed(voicing.transpose);

                match validate(pitch.midi, &setup.range) {
                    Validation::Playable => EventKind::Tone(Tone {
                        voice: token.voice,
                        pitch,
                    }),
                    Validation::OutOfRange => {
                        let diagnostic = Diagnostic::OutOfRange {
                            symbol,
                            voice: token.voice,
                            midi: pitch.midi,
                            range: setup.range,
                            position: token.position,
                        };
                        tracing::warn!(%diagnostic, "note out of range");
                        plan.diagnostics.push(diagnostic);
                        EventKind::ErrorIndicator(ErrorCause::OutOfRange)
                    }
                }
            }
        };

        plan.entries.push(ScheduleEntry {
            offset,
            duration,
            token: token.clone(),
            kind,
        });
        beats += multiplier;
    }

    plan.total = Duration::from_secs_f64(beats * beat_secs);
    plan
}

fn position(diagnostic: &Diagnostic) -> usize {
    match diagnostic {
        Diagnostic::UnrecognizedToken { position, .. }
        | Diagnostic::DisallowedOctaveExtension { position, .. }
        | Diagnostic::OutOfRange { position, .. } => *position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NinkError;
    use crate::notation::{RangeMode, SpacePolicy};

    fn config(tempo: f64, base: &str, mode: RangeMode) -> SessionConfig {
        SessionConfig {
            tempo,
            base_note: base.to_string(),
            range_mode: mode,
            ..Default::default()
        }
    }

    fn midi_of(entry: &ScheduleEntry) -> Option<i32> {
        match entry.kind {
            EventKind::Tone(tone) => Some(tone.pitch.midi),
            _ => None,
        }
    }

    #[test]
    fn test_three_notes_at_120_bpm() {
        let plan = compile("D R M", &config(120.0, "C4", RangeMode::Normal)).unwrap();
        let notes: Vec<&ScheduleEntry> = plan.audible().collect();

        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].offset, Duration::ZERO);
        assert_eq!(notes[1].offset, Duration::from_millis(500));
        assert_eq!(notes[2].offset, Duration::from_millis(1000));
        assert!(notes.iter().all(|n| n.duration == Duration::from_millis(500)));
        assert_eq!(
            notes.iter().map(|n| midi_of(n)).collect::<Vec<_>>(),
            vec![Some(60), Some(62), Some(64)]
        );
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.total, Duration::from_millis(1500));
    }

    #[test]
    fn test_spaces_as_rests_take_a_beat() {
        let mut cfg = config(120.0, "C4", RangeMode::Normal);
        cfg.spaces = SpacePolicy::Rest;
        let plan = compile("D R M", &cfg).unwrap();
        let offsets: Vec<Duration> = plan.audible().map(|e| e.offset).collect();
        assert_eq!(
            offsets,
            vec![Duration::ZERO, Duration::from_millis(1000), Duration::from_millis(2000)]
        );
        assert_eq!(plan.len(), 5);
        assert_eq!(plan.total, Duration::from_millis(2500));
    }

    #[test]
    fn test_prefixed_space_holds_time() {
        let plan = compile("D_ R", &config(120.0, "C4", RangeMode::Normal)).unwrap();
        assert_eq!(plan.len(), 3);
        assert!(matches!(plan.entries[1].kind, EventKind::Rest));
        assert_eq!(plan.entries[1].duration, Duration::from_millis(1000));
        assert_eq!(plan.entries[2].offset, Duration::from_millis(1500));
        assert!(plan.diagnostics.is_empty());
    }

    #[test]
    fn test_dot_rest_takes_a_beat() {
        let plan = compile("D.R", &config(120.0, "C4", RangeMode::Normal)).unwrap();
        assert!(matches!(plan.entries[1].kind, EventKind::Rest));
        assert_eq!(plan.entries[2].offset, Duration::from_millis(1000));
    }

    #[test]
    fn test_quarter_beat_prefix_at_60_bpm() {
        let plan = compile("::D S", &config(60.0, "C4", RangeMode::Normal)).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.entries[0].offset, Duration::ZERO);
        assert_eq!(plan.entries[0].duration, Duration::from_millis(250));

        let sol = &plan.entries[1];
        assert_eq!(midi_of(sol), Some(67));
        assert_eq!(sol.duration, Duration::from_secs(1));
        assert_eq!(sol.offset, Duration::from_millis(250));
    }

    #[test]
    fn test_offsets_are_cumulative_and_monotone() {
        let plan = compile("::D:R_M__F .S`*/L~T", &config(97.0, "A3", RangeMode::Full)).unwrap();
        let beat = 60.0 / 97.0;
        let mut expected = 0.0;
        let mut previous = Duration::ZERO;
        for entry in &plan.entries {
            assert!(entry.offset >= previous);
            assert!((entry.offset.as_secs_f64() - expected * beat).abs() < 1e-6);
            previous = entry.offset;
            expected += entry.token.duration.multiplier();
        }
    }

    #[test]
    fn test_doubled_marker_in_higher_mode() {
        let plan = compile("//D", &config(120.0, "C4", RangeMode::Higher)).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(midi_of(&plan.entries[0]), Some(84));
        assert!(plan.diagnostics.is_empty());
    }

    #[test]
    fn test_doubled_marker_in_normal_mode() {
        let plan = compile("//D", &config(120.0, "C4", RangeMode::Normal)).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan.entries[0].kind,
            EventKind::ErrorIndicator(ErrorCause::DisallowedOctaveExtension(
                ControlMarker::UpTwoOctaves
            ))
        );
        assert_eq!(plan.entries[0].duration, Duration::from_millis(500));
        assert_eq!(plan.diagnostics.len(), 1);
    }

    #[test]
    fn test_out_of_range_becomes_error_indicator() {
        // Normal range on C4 tops out at B5 (83). Ti two octaves up is 95.
        let plan = compile("/TD", &config(120.0, "C4", RangeMode::Normal)).unwrap();
        assert_eq!(midi_of(&plan.entries[0]), Some(83));
        assert_eq!(midi_of(&plan.entries[1]), Some(72));

        let plan = compile("\\D", &config(120.0, "A0", RangeMode::Full)).unwrap();
        assert_eq!(
            plan.entries[0].kind,
            EventKind::ErrorIndicator(ErrorCause::OutOfRange)
        );
        assert!(matches!(
            plan.diagnostics[0],
            Diagnostic::OutOfRange { midi: 9, .. }
        ));
        assert_eq!(plan.entries[0].offset, Duration::ZERO);
    }

    #[test]
    fn test_transpose_moves_notes_not_ranges() {
        let mut cfg = config(120.0, "C4", RangeMode::Normal);
        cfg.transpose = 3;
        let plan = compile("D/T", &cfg).unwrap();
        assert_eq!(midi_of(&plan.entries[0]), Some(63));
        // 60 + 11 + 12 + 3 = 86 > 83
        assert_eq!(
            plan.entries[1].kind,
            EventKind::ErrorIndicator(ErrorCause::OutOfRange)
        );
    }

    #[test]
    fn test_voices_use_their_own_naturals() {
        let mut cfg = config(120.0, "C4", RangeMode::Normal);
        cfg.secondary_natural = Some("G4".to_string());
        let plan = compile("D*D`D", &cfg).unwrap();
        let tones: Vec<Tone> = plan
            .entries
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::Tone(tone) => Some(tone),
                _ => None,
            })
            .collect();
        assert_eq!(tones[0].voice, Voice::Primary);
        assert_eq!(tones[0].pitch.midi, 60);
        assert_eq!(tones[1].voice, Voice::Secondary);
        assert_eq!(tones[1].pitch.midi, 67);
        assert_eq!(tones[2].pitch.midi, 60);
    }

    #[test]
    fn test_unrecognized_characters_take_no_time() {
        let plan = compile("DxR", &config(120.0, "C4", RangeMode::Normal)).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.entries[1].offset, Duration::from_millis(500));
        assert_eq!(
            plan.diagnostics,
            vec![Diagnostic::UnrecognizedToken { ch: 'x', position: 1 }]
        );
    }

    #[test]
    fn test_malformed_base_note_builds_nothing() {
        let result = compile("DRM", &config(120.0, "Q4", RangeMode::Normal));
        assert!(matches!(result, Err(NinkError::MalformedBaseNote(_))));
    }

    #[test]
    fn test_invalid_tempo() {
        for tempo in [0.0, 1e-300, 1e300] {
            let result = compile("DRM", &config(tempo, "C4", RangeMode::Normal));
            assert!(matches!(result, Err(NinkError::InvalidTempo(_))));
        }
    }
}
