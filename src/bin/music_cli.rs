use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use music_analyzer::analysis::ListenSummary;
use music_analyzer::cache::fixture::{load_entries, save_entries};
use music_analyzer::clock::ManualClock;
use music_analyzer::fixtures::{
    replay_source, write_wav, AudioSource, ProgressionSpec, SyntheticSource, WavSource,
};
use music_analyzer::structure::{Segment, SongStructureAnalyzer};
use music_analyzer::telemetry::{self, TelemetrySnapshot};
use music_analyzer::{
    AppConfig, AudioError, CacheEntry, CacheError, ErrorCode, MusicAnalyzer, SoundCache,
};
use serde::Serialize;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(
    name = "music_cli",
    about = "Chord, key, tempo and song structure analysis harness"
)]
struct Cli {
    /// JSON configuration file (defaults to assets/analyzer_config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Segment a recorded cache fixture (one JSON entry per line)
    Analyze {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        lookback: Option<f64>,
        #[arg(long)]
        bin: Option<f64>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the cache summary of a recorded fixture
    Summary {
        #[arg(long)]
        input: PathBuf,
    },
    /// Run a WAV file or a synthetic progression through the full pipeline
    Replay {
        /// WAV input; a synthetic progression is rendered when omitted
        #[arg(long)]
        wav: Option<PathBuf>,
        /// Comma-separated chord labels for the synthetic progression
        #[arg(long, default_value = "C,G,Am,F")]
        chords: String,
        #[arg(long, default_value_t = 2.0)]
        seconds_per_chord: f32,
        #[arg(long)]
        click_bpm: Option<f32>,
        #[arg(long, default_value_t = 0.0)]
        noise: f32,
        #[arg(long, default_value_t = 22_050)]
        sample_rate: u32,
        /// Save the resulting cache entries as a fixture
        #[arg(long)]
        save_cache: Option<PathBuf>,
        /// Save the rendered synthetic audio
        #[arg(long)]
        save_wav: Option<PathBuf>,
    },
    /// Capture from the default input device, then segment what was heard
    #[cfg(feature = "capture")]
    Listen {
        #[arg(long, default_value_t = 30.0)]
        seconds: f64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            if let Some(cache_err) = err.downcast_ref::<CacheError>() {
                telemetry::hub().record_cache_error(cache_err, "music_cli");
                eprintln!("Error {}: {}", cache_err.code(), cache_err.message());
                return ExitCode::from(2);
            }
            if let Some(audio_err) = err.downcast_ref::<AudioError>() {
                telemetry::hub().record_audio_error(audio_err, "music_cli");
            }
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Analyze {
            input,
            lookback,
            bin,
            output,
        } => run_analyze(config, &input, lookback, bin, output),
        Commands::Summary { input } => run_summary(config, &input),
        Commands::Replay {
            wav,
            chords,
            seconds_per_chord,
            click_bpm,
            noise,
            sample_rate,
            save_cache,
            save_wav,
        } => {
            let source: Box<dyn AudioSource> = match wav {
                Some(path) => Box::new(WavSource::open(&path)?),
                None => {
                    let spec = ProgressionSpec {
                        chords: chords.split(',').map(|c| c.trim().to_string()).collect(),
                        seconds_per_chord,
                        click_bpm,
                        noise_level: noise,
                        ..ProgressionSpec::default()
                    };
                    let source = SyntheticSource::progression(&spec, sample_rate)?;
                    if let Some(path) = &save_wav {
                        write_wav(path, source.samples(), sample_rate)?;
                    }
                    Box::new(source)
                }
            };
            run_replay(config, source, save_cache)
        }
        #[cfg(feature = "capture")]
        Commands::Listen { seconds } => run_listen(config, seconds),
    }
}

/// Cache holding a recorded fixture, with "now" at its last entry
fn load_fixture_cache(config: &AppConfig, input: &Path) -> Result<SoundCache> {
    let entries = load_entries(input).with_context(|| format!("loading {}", input.display()))?;
    let now = entries.iter().map(|e| e.timestamp).fold(0.0, f64::max);
    let clock = Arc::new(ManualClock::new(now));
    Ok(SoundCache::from_entries(
        config.cache.window_seconds,
        clock,
        entries,
    ))
}

fn run_analyze(
    config: AppConfig,
    input: &Path,
    lookback: Option<f64>,
    bin: Option<f64>,
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    let cache = load_fixture_cache(&config, input)?;
    let mut structure = config.structure.clone();
    if let Some(lookback) = lookback {
        structure.lookback_seconds = lookback;
    }
    if let Some(bin) = bin {
        structure.bin_seconds = bin;
    }

    let segments = SongStructureAnalyzer::new(structure).analyze(&cache)?;
    let report = AnalyzeReport {
        input: input.display().to_string(),
        entries: cache.len(),
        segment_count: segments.len(),
        segments: &segments,
    };
    emit_json(&report, output)?;
    Ok(ExitCode::SUCCESS)
}

fn run_summary(config: AppConfig, input: &Path) -> Result<ExitCode> {
    let cache = load_fixture_cache(&config, input)?;
    println!("{cache}");
    Ok(ExitCode::SUCCESS)
}

fn run_replay(
    mut config: AppConfig,
    source: Box<dyn AudioSource>,
    save_cache: Option<PathBuf>,
) -> Result<ExitCode> {
    config.audio.sample_rate = source.sample_rate();
    let mut analyzer = MusicAnalyzer::for_replay(config, 0.0)?;
    let summary = replay_source(&mut analyzer, source)?;

    let entries = analyzer.cache().entries();
    if let Some(path) = save_cache {
        save_entries(&path, &entries).with_context(|| format!("writing {}", path.display()))?;
    }

    let segments = analyzer.analyze_song_structure()?;
    let key = analyzer.current_key();
    let report = ReplayReport {
        summary,
        chords: chord_timeline(&entries),
        key: key.key,
        key_confidence: key.confidence,
        bpm: analyzer.last_bpm(),
        segments: &segments,
        telemetry: telemetry::hub().snapshot(),
    };
    emit_json(&report, None)?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(feature = "capture")]
fn run_listen(mut config: AppConfig, seconds: f64) -> Result<ExitCode> {
    use music_analyzer::audio::{BufferPool, CaptureEngine, OverflowPolicy};
    use music_analyzer::clock::SystemClock;
    use std::sync::atomic::AtomicBool;

    let mut engine = CaptureEngine::open_default()?;
    config.audio.sample_rate = engine.sample_rate();
    let block_size = config.audio.block_size();

    let (producer, mut consumer) = BufferPool::new(
        config.audio.queue_capacity,
        block_size,
        OverflowPolicy::DropIncoming,
    )
    .split();
    let clock = Arc::new(SystemClock::new());
    let cache = Arc::new(SoundCache::with_clock(config.cache.window_seconds, clock.clone()));
    let mut analyzer = MusicAnalyzer::new(config, cache, clock)?;

    engine.start(producer, block_size)?;
    let running = AtomicBool::new(true);
    let result = analyzer.analyze_song_structure_live(&mut consumer, seconds, &running);
    engine.stop();

    let (summary, segments) = result?;
    let key = analyzer.current_key();
    let entries = analyzer.cache().entries();
    let report = ReplayReport {
        summary,
        chords: chord_timeline(&entries),
        key: key.key,
        key_confidence: key.confidence,
        bpm: analyzer.last_bpm(),
        segments: &segments,
        telemetry: telemetry::hub().snapshot(),
    };
    emit_json(&report, None)?;
    Ok(ExitCode::SUCCESS)
}

/// Chord labels in order of appearance, consecutive repeats collapsed
fn chord_timeline(entries: &[CacheEntry]) -> Vec<String> {
    let mut chords: Vec<String> = Vec::new();
    for entry in entries {
        if chords.last() != Some(&entry.chord) {
            chords.push(entry.chord.clone());
        }
    }
    chords
}

fn emit_json<T: Serialize>(report: &T, output: Option<PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

#[derive(Serialize)]
struct AnalyzeReport<'a> {
    input: String,
    entries: usize,
    segment_count: usize,
    segments: &'a [Segment],
}

#[derive(Serialize)]
struct ReplayReport<'a> {
    summary: ListenSummary,
    chords: Vec<String>,
    key: String,
    key_confidence: f32,
    bpm: Option<f32>,
    segments: &'a [Segment],
    telemetry: TelemetrySnapshot,
}
