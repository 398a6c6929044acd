use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use haptic_player_core::{
    ActuatorBackend, LineProtocolActuator, LogActuator, PacingConfig, PlayerConfig, Score,
    Session,
};
use tracing_subscriber::EnvFilter;

/// Spin window used when `--pacing hybrid` is given without one.
const DEFAULT_SPIN_WINDOW_US: u64 = 1_000;

fn main() -> haptic_player_core::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Play(args) => run_play(args),
        Commands::Inspect { input, json } => {
            init_tracing(false);
            run_inspect(&input, json)
        }
    }
}

fn run_play(args: PlayArgs) -> haptic_player_core::Result<()> {
    let config = args.into_config()?;
    init_tracing(config.debug);
    tracing::info!(input = ?config.input, debug = config.debug, "starting playback");

    let backend = build_backend(&config)?;
    let session = Session::open(config, backend)?;
    let report = session.run()?;

    tracing::info!(
        triggered = report.notes_triggered,
        dropped = report.notes_dropped_busy,
        skipped = report.notes_skipped_malformed,
        failures = report.trigger_failures,
        "stopped"
    );
    Ok(())
}

fn run_inspect(input: &Path, json: bool) -> haptic_player_core::Result<()> {
    let score = Score::load(input)?;
    let summary = score.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("division:        {} ticks per quarter", summary.ticks_per_quarter);
    println!("tracks:          {}", summary.tracks);
    println!("notes:           {}", summary.notes);
    println!("malformed notes: {}", summary.malformed_notes);
    println!("tempo changes:   {}", summary.tempo_changes);
    println!("length:          {} ticks", summary.length_ticks);
    for (index, track) in score.tracks().iter().enumerate() {
        let name = track.name.as_deref().unwrap_or("<unnamed>");
        println!("  track {index}: {name} ({} events)", track.len());
    }
    Ok(())
}

fn build_backend(config: &PlayerConfig) -> haptic_player_core::Result<Arc<dyn ActuatorBackend>> {
    if config.debug {
        return Ok(Arc::new(LogActuator::new(config.debug_channels)));
    }

    let sink: Box<dyn Write + Send> = match &config.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    };
    Ok(Arc::new(LineProtocolActuator::new(&config.channels, sink)?))
}

/// Logs go to stderr so stdout stays free for the pulse stream.
fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Plays MIDI files on haptic controllers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a MIDI file on the discovered haptic channels.
    Play(PlayArgs),
    /// Print a summary of a MIDI file without playing it.
    Inspect {
        /// Path to the *.mid file.
        input: PathBuf,
        /// Emit the summary as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Path to the *.mid file.
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Playback volume (haptic intensity) from 0 to 1.
    #[arg(short, long)]
    volume: Option<f32>,
    /// Time in ms during which a channel may start another note before the
    /// current one finishes.
    #[arg(short, long)]
    tolerance: Option<f64>,
    /// Log debugging messages and play on virtual channels instead of hardware.
    #[arg(short, long)]
    debug: bool,
    /// JSON configuration file; flags given on the command line win.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// How to wait between ticks.
    #[arg(long, value_enum)]
    pacing: Option<PacingMode>,
    /// Final stretch of each tick spent spinning in hybrid pacing.
    #[arg(long)]
    spin_window_us: Option<u64>,
    /// Haptic channel path announced to the pulse stream; repeatable.
    #[arg(long = "channel")]
    channels: Vec<String>,
    /// Write the pulse stream to a file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PacingMode {
    Spin,
    Hybrid,
}

impl PlayArgs {
    fn into_config(self) -> haptic_player_core::Result<PlayerConfig> {
        let mut config = match &self.config {
            Some(path) => PlayerConfig::load(path)?,
            None => PlayerConfig::default(),
        };

        if let Some(input) = self.input {
            config.input = Some(input);
        }
        if let Some(volume) = self.volume {
            config.volume = volume;
        }
        if let Some(tolerance) = self.tolerance {
            config.tolerance_ms = tolerance;
        }
        config.debug |= self.debug;
        if !self.channels.is_empty() {
            config.channels = self.channels;
        }
        if self.output.is_some() {
            config.output = self.output;
        }

        match (self.pacing, self.spin_window_us) {
            (Some(PacingMode::Spin), _) => config.pacing = PacingConfig::Spin,
            (Some(PacingMode::Hybrid), window) => {
                config.pacing = PacingConfig::Hybrid {
                    spin_window_us: window.unwrap_or(DEFAULT_SPIN_WINDOW_US),
                }
            }
            (None, Some(window)) => {
                if let PacingConfig::Hybrid { spin_window_us } = &mut config.pacing {
                    *spin_window_us = window;
                }
            }
            (None, None) => {}
        }

        config.input_path()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> PlayArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Play(args) => args,
            other => panic!("expected play, got {other:?}"),
        }
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "haptic-player",
            "play",
            "-i",
            "song.mid",
            "-v",
            "0.5",
            "-t",
            "10",
            "--pacing",
            "hybrid",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.input, Some(PathBuf::from("song.mid")));
        assert_eq!(config.volume, 0.5);
        assert_eq!(config.tolerance_ms, 10.0);
        assert_eq!(
            config.pacing,
            PacingConfig::Hybrid {
                spin_window_us: DEFAULT_SPIN_WINDOW_US
            }
        );
        assert!(!config.debug);
    }

    #[test]
    fn input_is_required() {
        let err = parse(&["haptic-player", "play", "-d"]).into_config().unwrap_err();
        assert!(format!("{err}").contains("input"));
    }

    #[test]
    fn repeated_channel_flags_are_collected() {
        let config = parse(&[
            "haptic-player",
            "play",
            "-i",
            "song.mid",
            "--channel",
            "/devices/left",
            "--channel",
            "/devices/right",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.channels, vec!["/devices/left", "/devices/right"]);
    }

    #[test]
    fn debug_backend_exposes_virtual_channels() {
        let config = PlayerConfig {
            debug: true,
            debug_channels: 3,
            ..Default::default()
        };
        let backend = build_backend(&config).unwrap();
        assert_eq!(backend.channels().len(), 3);
    }

    #[test]
    fn hardware_backend_needs_channels() {
        let config = PlayerConfig::default();
        assert!(build_backend(&config).is_err());
    }
}
