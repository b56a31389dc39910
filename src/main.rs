//! ninkplay - Plays Nink solfège notation.
//!
//! Compiles a notation string into a timed schedule and plays it through the
//! default audio device, renders it to a WAV file, or prints it.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- "D R M F S"              # Play with the built-in voices
//! cargo run -- -t 90 -b A3 "::D:R_M"    # Slower, on a lower base note
//! echo "DRM" | cargo run -- --dry-run   # Print the schedule instead
//! cargo run -- -o tune.wav "DRMFSLTD"   # Export to WAV
//! ```
//!
//! Set `RUST_LOG=debug` to see every scheduled entry.

use anyhow::{Context, Result};
use ninkplay::audio::{export_to_wav, AudioEngine};
use ninkplay::config::SessionConfig;
use ninkplay::notation::{note_to_name, RangeMode, SpacePolicy};
use ninkplay::playback::{
    compile, BackendCall, Clock, Plan, RealtimeClock, RecordingBackend, Scheduler, VirtualClock,
};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How often live playback checks whether the session has finished.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Time left for the last note to ring out before exiting.
const RELEASE_TAIL: Duration = Duration::from_millis(400);

/// Command-line options for the application.
#[derive(Default)]
struct CliOptions {
    /// Notation to play. Read from stdin when absent.
    notation: Option<String>,
    /// Session configuration file (JSON).
    config: Option<PathBuf>,
    tempo: Option<f64>,
    base: Option<String>,
    range: Option<RangeMode>,
    spaces: Option<SpacePolicy>,
    primary: Option<String>,
    secondary: Option<String>,
    transpose: Option<i32>,
    /// Path to a SoundFont file for the voices.
    soundfont: Option<PathBuf>,
    /// Render to this WAV file instead of playing.
    export: Option<PathBuf>,
    /// Print the schedule without making any sound.
    dry_run: bool,
}

/// Returns the argument after the flag at `i`, or exits with an error.
fn flag_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> &'a str {
    *i += 1;
    match args.get(*i) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires an argument", flag);
            std::process::exit(1);
        }
    }
}

/// Parses a flag value or exits with an error.
fn parse_value<T: std::str::FromStr>(value: &str, flag: &str) -> T {
    match value.parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            eprintln!("Error: invalid value for {}: {}", flag, value);
            std::process::exit(1);
        }
    }
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Options override the matching fields of the configuration file. The
    /// first positional argument is the notation.
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut options = Self::default();
        let mut i = 1;

        while i < args.len() {
            let arg = args[i].as_str();
            match arg {
                "--tempo" | "-t" => {
                    options.tempo = Some(parse_value(flag_value(&args, &mut i, arg), arg))
                }
                "--base" | "-b" => options.base = Some(flag_value(&args, &mut i, arg).to_string()),
                "--range" | "-r" => {
                    options.range = Some(parse_value(flag_value(&args, &mut i, arg), arg))
                }
                "--spaces" => {
                    options.spaces = match flag_value(&args, &mut i, arg) {
                        "separator" => Some(SpacePolicy::Separator),
                        "rest" => Some(SpacePolicy::Rest),
                        other => {
                            eprintln!("Error: --spaces must be 'separator' or 'rest', got {}", other);
                            std::process::exit(1);
                        }
                    }
                }
                "--primary" => {
                    options.primary = Some(flag_value(&args, &mut i, arg).to_string())
                }
                "--secondary" => {
                    options.secondary = Some(flag_value(&args, &mut i, arg).to_string())
                }
                "--transpose" => {
                    options.transpose = Some(parse_value(flag_value(&args, &mut i, arg), arg))
                }
                "--config" | "-c" => {
                    options.config = Some(PathBuf::from(flag_value(&args, &mut i, arg)))
                }
                "--soundfont" | "-sf" => {
                    options.soundfont = Some(PathBuf::from(flag_value(&args, &mut i, arg)))
                }
                "--export" | "-o" => {
                    options.export = Some(PathBuf::from(flag_value(&args, &mut i, arg)))
                }
                "--dry-run" => options.dry_run = true,
                "--help" | "-h" => {
                    print_help(args.first().map(String::as_str).unwrap_or("ninkplay"));
                    std::process::exit(0);
                }
                other if options.notation.is_none() && !other.starts_with('-') => {
                    options.notation = Some(other.to_string());
                }
                other => {
                    eprintln!("Unknown option: {}", other);
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
            i += 1;
        }

        Ok(options)
    }

    /// Builds the session configuration: file first, then flag overrides.
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => SessionConfig::default(),
        };

        if let Some(tempo) = self.tempo {
            config.tempo = tempo;
        }
        if let Some(base) = &self.base {
            config.base_note = base.clone();
        }
        if let Some(range) = self.range {
            config.range_mode = range;
        }
        if let Some(spaces) = self.spaces {
            config.spaces = spaces;
        }
        if let Some(primary) = &self.primary {
            config.primary_natural = Some(primary.clone());
        }
        if let Some(secondary) = &self.secondary {
            config.secondary_natural = Some(secondary.clone());
        }
        if let Some(transpose) = self.transpose {
            config.transpose = transpose;
        }

        Ok(config)
    }
}

fn print_help(program: &str) {
    eprintln!("ninkplay - Nink solfège notation player");
    eprintln!();
    eprintln!("Usage: {} [OPTIONS] [NOTATION]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -t, --tempo BPM        Beats per minute (default 120)");
    eprintln!("  -b, --base NOTE        Note that D (Do) maps to (default C4)");
    eprintln!("  -r, --range MODE       normal, lower, higher or full (default normal)");
    eprintln!("      --spaces POLICY    separator or rest (default separator)");
    eprintln!("      --primary NOTE     Natural pitch of the primary voice");
    eprintln!("      --secondary NOTE   Natural pitch of the secondary voice");
    eprintln!("      --transpose N      Shift every note by N semitones (-8 to 8)");
    eprintln!("  -c, --config PATH      Load session configuration from a JSON file");
    eprintln!("  -sf, --soundfont PATH  Play the voices with a SoundFont file (.sf2)");
    eprintln!("  -o, --export PATH      Render to a WAV file instead of playing");
    eprintln!("      --dry-run          Print the schedule without playing");
    eprintln!("  -h, --help             Print this help message");
    eprintln!();
    eprintln!("If NOTATION is omitted it is read from standard input.");
}

/// Reads notation from stdin, joining lines.
fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read notation from stdin")?;
    Ok(buf.lines().collect())
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = cli.session_config()?;
    let notation = match &cli.notation {
        Some(notation) => notation.clone(),
        None => read_stdin()?,
    };

    let plan = compile(&notation, &config).context("Failed to compile notation")?;
    for diagnostic in &plan.diagnostics {
        eprintln!("warning: {}", diagnostic);
    }

    if cli.dry_run {
        print_schedule(&plan);
        return Ok(());
    }

    if let Some(path) = &cli.export {
        export_to_wav(
            &plan,
            path,
            Some(|progress: f32| eprint!("\rExporting... {:3.0}%", progress * 100.0)),
        )?;
        eprintln!("\rExported {}", path.display());
        return Ok(());
    }

    play(&plan, &cli, &config)
}

/// Runs the plan on a virtual clock and prints every backend call.
fn print_schedule(plan: &Plan) {
    let backend = Arc::new(RecordingBackend::new());
    let mut scheduler = Scheduler::new(VirtualClock::new(), backend.clone());
    scheduler.play(plan);
    scheduler.clock().run_until_idle();

    for call in backend.calls() {
        match call {
            BackendCall::Tone { tone, duration, at } => println!(
                "{:>8.3}s  {:<9} {:<4} {:>8.2} Hz  {:.3}s",
                at.as_secs_f64(),
                tone.voice,
                note_to_name(tone.pitch.midi),
                tone.pitch.frequency,
                duration.as_secs_f64()
            ),
            BackendCall::ErrorIndicator { duration, at } => println!(
                "{:>8.3}s  error indicator           {:.3}s",
                at.as_secs_f64(),
                duration.as_secs_f64()
            ),
        }
    }
    println!("total {:.3}s", plan.total.as_secs_f64());
}

/// Plays the plan live and waits for it to finish.
fn play(plan: &Plan, cli: &CliOptions, config: &SessionConfig) -> Result<()> {
    // A missing SoundFont falls back to the built-in voices
    let soundfont = cli.soundfont.as_deref().filter(|path| {
        let exists = path.exists();
        if !exists {
            eprintln!("Warning: SoundFont not found: {}", path.display());
            eprintln!("Using the built-in voices.");
        }
        exists
    });

    let engine = AudioEngine::new(soundfont, config).context("Failed to initialize audio")?;
    let output = engine.output();
    tracing::info!(
        voices = if output.uses_soundfont() { "soundfont" } else { "built-in" },
        "audio ready"
    );
    let clock = RealtimeClock::new().context("Failed to start playback clock")?;
    let mut scheduler = Scheduler::new(clock, Arc::new(output));

    let handle = scheduler.play(plan);
    while !handle.is_finished() {
        std::thread::sleep(POLL_INTERVAL);
    }

    // The last entry fires at its start; let it sound for its full duration
    if let Some(session) = scheduler.session() {
        let remaining = session.ends_at().saturating_sub(scheduler.clock().now());
        std::thread::sleep(remaining + RELEASE_TAIL);
    }

    scheduler.stop();
    engine.silence();
    Ok(())
}
