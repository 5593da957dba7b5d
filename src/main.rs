//! Mood Mirror CLI
//!
//! Replays recorded expression-model output through the smoothing loop.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use mood_mirror::{
    config::Config,
    core::{emoji, history::LabelRecord},
    sampler::ANIMATION_FRAME,
    stats::create_shared_stats_with_persistence,
    AbsencePolicy, Cadence, ConsolePresenter, DetectionLoop, LabelHistory, ReplayProvider,
    Strategy, SyntheticVideo, VERSION,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "mood-mirror")]
#[command(version = VERSION)]
#[command(about = "Turns per-frame expression scores into a stable emoji label", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detection loop over recorded detector output
    Run {
        /// JSON Lines file with one detection sample per line
        #[arg(long, short)]
        input: PathBuf,

        /// Label strategy (overrides the config file)
        #[arg(long, value_enum)]
        strategy: Option<Strategy>,

        /// What a frame without a face does (overrides the config file)
        #[arg(long, value_enum)]
        absence: Option<AbsencePolicy>,

        /// Detector cadence (overrides the config file)
        #[arg(long, value_enum)]
        cadence: Option<CadenceArg>,

        /// Cadence period in milliseconds
        #[arg(long)]
        period_ms: Option<u64>,

        /// Time between label decisions in milliseconds
        #[arg(long)]
        cycle_ms: Option<u64>,

        /// Simulated model latency per frame in milliseconds
        #[arg(long, default_value = "0")]
        latency_ms: u64,

        /// Polls before the simulated camera reports its dimensions
        #[arg(long, default_value = "0")]
        camera_warmup: usize,

        /// Polls before the simulated models finish loading
        #[arg(long, default_value = "0")]
        model_load_polls: usize,

        /// Skip writing the label history on exit
        #[arg(long)]
        no_export: bool,
    },

    /// Show cumulative statistics
    Status,

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },

    /// Combine exported label histories into one file
    Export {
        /// Output directory (defaults to the configured export path)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Export format
        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,
    },

    /// Print the emotion to emoji table
    Emojis,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CadenceArg {
    /// Every display frame
    Continuous,
    /// Once per period
    Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Json,
    Jsonl,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            input,
            strategy,
            absence,
            cadence,
            period_ms,
            cycle_ms,
            latency_ms,
            camera_warmup,
            model_load_polls,
            no_export,
        } => {
            let mut config = load_config();
            if let Some(strategy) = strategy {
                config.strategy = strategy;
            }
            if let Some(absence) = absence {
                config.absence = absence;
            }
            if let Some(cycle_ms) = cycle_ms {
                config.cycle_period = Duration::from_millis(cycle_ms);
            }
            config.cadence = resolve_cadence(config.cadence, cadence, period_ms);

            let replay = ReplayOptions {
                input,
                latency: Duration::from_millis(latency_ms),
                camera_warmup,
                model_load_polls,
                export: !no_export,
            };
            cmd_run(config, replay).await
        }
        Commands::Status => cmd_status(),
        Commands::Config { save } => cmd_config(save),
        Commands::Export { output, format } => cmd_export(output, format),
        Commands::Emojis => {
            cmd_emojis();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

struct ReplayOptions {
    input: PathBuf,
    latency: Duration,
    camera_warmup: usize,
    model_load_polls: usize,
    export: bool,
}

async fn cmd_run(config: Config, options: ReplayOptions) -> anyhow::Result<()> {
    config.validate().context("invalid settings")?;

    println!("Mood Mirror v{VERSION}");
    println!();

    let provider = ReplayProvider::from_jsonl(&options.input)
        .with_context(|| format!("could not read {:?}", options.input))?
        .with_load_delay(options.model_load_polls)
        .with_latency(options.latency);
    let video = SyntheticVideo::new(480, 360).with_warmup(options.camera_warmup);

    println!("Replaying {} samples from {:?}", provider.remaining(), options.input);
    println!("  Strategy: {:?}", config.strategy);
    println!("  Absence policy: {:?}", config.absence);
    println!("  Cycle period: {}ms", config.cycle_period.as_millis());
    println!("  Cadence: {:?}", config.cadence);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    let stats = create_shared_stats_with_persistence(config.stats_path());

    let (detection_loop, handle) =
        DetectionLoop::from_config(provider, video, ConsolePresenter::new(), &config);
    let detection_loop = detection_loop.with_stats(stats.clone());

    ctrlc::set_handler(move || handle.stop()).context("could not install Ctrl+C handler")?;

    let outcome = detection_loop.run().await;

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save session stats: {e}");
    }
    let report = outcome?;

    println!();
    println!("Final label: {}", report.final_emotion);

    if options.export && !report.history.is_empty() {
        let path = LabelHistory::export_path(&config.export_path, Utc::now());
        report
            .history
            .write_json(&path)
            .with_context(|| format!("could not write {path:?}"))?;
        println!("Exported {} labels to {:?}", report.history.len(), path);
    }

    println!();
    println!("{}", stats.summary());
    Ok(())
}

fn cmd_status() -> anyhow::Result<()> {
    let config = load_config();

    println!("Mood Mirror Status");
    println!("==================");
    println!();

    println!("Configuration:");
    println!("  Strategy: {:?}", config.strategy);
    println!("  Absence policy: {:?}", config.absence);
    println!("  Cycle period: {}ms", config.cycle_period.as_millis());
    match config.max_samples {
        Some(max) => println!("  Max samples per window: {max}"),
        None => println!("  Max samples per window: unbounded"),
    }
    println!();

    let stats_path = config.stats_path();
    if stats_path.exists() {
        let content = std::fs::read_to_string(&stats_path)
            .with_context(|| format!("could not read {stats_path:?}"))?;
        let stats: serde_json::Value =
            serde_json::from_str(&content).context("stats file is not valid JSON")?;

        println!("Cumulative Statistics:");
        for (key, label) in [
            ("frames_sampled", "Frames sampled"),
            ("face_samples", "Samples with a face"),
            ("no_face_samples", "Samples without a face"),
            ("detection_failures", "Detection failures"),
            ("flushes", "Windows flushed"),
            ("label_changes", "Label changes"),
        ] {
            if let Some(value) = stats.get(key) {
                println!("  {label}: {value}");
            }
        }
    } else {
        println!("No previous session data found.");
    }

    let sessions = LabelHistory::read_dir(&config.export_path);
    if let Some(last) = sessions.last() {
        println!();
        println!("Exported sessions: {}", sessions.len());
        println!(
            "  Last: {} ({} labels)",
            last.started_at.format("%Y-%m-%d %H:%M:%S"),
            last.len()
        );
    }
    Ok(())
}

fn cmd_config(save: bool) -> anyhow::Result<()> {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);

    if save {
        config.save().context("could not save configuration")?;
        println!();
        println!("Saved.");
    }
    Ok(())
}

/// One line of a JSON Lines export.
#[derive(Serialize)]
struct ExportLine<'a> {
    session_id: Uuid,
    #[serde(flatten)]
    record: &'a LabelRecord,
}

fn cmd_export(output: Option<PathBuf>, format: ExportFormat) -> anyhow::Result<()> {
    let config = load_config();
    let export_dir = output.unwrap_or(config.export_path);

    let sessions = LabelHistory::read_dir(&export_dir);
    if sessions.is_empty() {
        println!("No session data found in {export_dir:?}");
        println!("Run 'mood-mirror run --input <file>' to record a session.");
        return Ok(());
    }

    let total: usize = sessions.iter().map(LabelHistory::len).sum();
    println!("Found {} session(s), {} labels in total", sessions.len(), total);

    let extension = match format {
        ExportFormat::Json => "json",
        ExportFormat::Jsonl => "jsonl",
    };
    let output_path = export_dir.join(format!(
        "export_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        extension
    ));

    let content = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&sessions)?,
        ExportFormat::Jsonl => {
            let mut lines = Vec::with_capacity(total);
            for session in &sessions {
                for record in &session.records {
                    lines.push(serde_json::to_string(&ExportLine {
                        session_id: session.session_id,
                        record,
                    })?);
                }
            }
            lines.join("\n")
        }
    };

    std::fs::write(&output_path, content)
        .with_context(|| format!("could not write {output_path:?}"))?;
    println!("Exported to {output_path:?}");
    Ok(())
}

fn cmd_emojis() {
    let config = load_config();

    println!("{:<22}Emoji", "Emotion");
    println!("{:<22}-----", "-------");
    for (name, symbol) in emoji::table(config.laugh_threshold) {
        println!("{name:<22}{symbol}");
    }
}

/// The saved configuration, or defaults when it is missing or invalid.
fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not load configuration, using defaults");
        Config::default()
    })
}

fn resolve_cadence(current: Cadence, mode: Option<CadenceArg>, period_ms: Option<u64>) -> Cadence {
    let period = period_ms.map(Duration::from_millis);
    match (mode, period) {
        (Some(CadenceArg::Continuous), period) => Cadence::Continuous {
            frame_interval: period.unwrap_or(ANIMATION_FRAME),
        },
        (Some(CadenceArg::Interval), period) => {
            Cadence::every(period.unwrap_or(Duration::from_millis(1000)))
        }
        (None, Some(period)) => match current {
            Cadence::Continuous { .. } => Cadence::Continuous {
                frame_interval: period,
            },
            Cadence::FixedInterval { .. } => Cadence::every(period),
        },
        (None, None) => current,
    }
}
