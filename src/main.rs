//! Drivesense Agent CLI
//!
//! Real-time driver-behavior inference from a 6-axis IMU.

use clap::{Parser, Subcommand, ValueEnum};
use drivesense_agent::{
    config::{parse_address, Config},
    emitter::{EmitterConfig, EmitterHandle},
    pipeline::{Classifier, DecisionConfig, FeatureSchema},
    recorder::SampleRecorder,
    sensor::{ReplaySource, SampleSource, SyntheticSource},
    stats::shared_stats_with_persistence,
    StreamController, StreamSettings, VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drivesense")]
#[command(author = "Drivesense")]
#[command(version = VERSION)]
#[command(about = "Real-time driver-behavior inference from a 6-axis IMU", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the inference stream
    Start {
        /// Where samples come from
        #[arg(long, value_enum, default_value_t = SourceKind::Mpu6050)]
        source: SourceKind,

        /// Sample log to replay (required with --source replay)
        #[arg(long)]
        replay_file: Option<PathBuf>,

        /// Sampling cadence in Hz
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Samples per analysis window
        #[arg(long)]
        window: Option<usize>,

        /// New samples between consecutive windows
        #[arg(long)]
        stride: Option<usize>,

        /// Minimum top-class confidence for a prediction to count
        #[arg(long)]
        confidence: Option<f64>,

        /// Consecutive confident predictions required to accept a downgrade
        #[arg(long)]
        debounce: Option<u32>,

        /// Trained model artifact (built-in reference model when omitted)
        #[arg(long)]
        model: Option<PathBuf>,

        /// I2C bus number
        #[arg(long)]
        bus: Option<u8>,

        /// I2C address, decimal or 0x-prefixed hex
        #[arg(long)]
        address: Option<String>,

        /// Disable event emission to the relay
        #[arg(long)]
        no_emit: bool,

        /// Relay endpoint receiving events
        #[arg(long)]
        emit_url: Option<String>,

        /// Write an annotated JSONL sample log
        #[arg(long)]
        record: bool,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Validate a model artifact against the feature schema
    Check {
        /// Model artifact to validate
        #[arg(long)]
        model: PathBuf,

        /// Sampling cadence the extractor would run at
        #[arg(long, default_value = "50")]
        sample_rate: u32,
    },

    /// Show configuration and persisted session counters
    Status,

    /// Show configuration
    Config,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// MPU6050 over the I2C bus (Linux only)
    Mpu6050,
    /// Deterministic synthetic motion
    Synthetic,
    /// Replay a recorded sample log
    Replay,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            source,
            replay_file,
            sample_rate,
            window,
            stride,
            confidence,
            debounce,
            model,
            bus,
            address,
            no_emit,
            emit_url,
            record,
            duration,
        } => {
            cmd_start(StartArgs {
                source,
                replay_file,
                sample_rate,
                window,
                stride,
                confidence,
                debounce,
                model,
                bus,
                address,
                no_emit,
                emit_url,
                record,
                duration,
            });
        }
        Commands::Check { model, sample_rate } => {
            cmd_check(&model, sample_rate);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

struct StartArgs {
    source: SourceKind,
    replay_file: Option<PathBuf>,
    sample_rate: Option<u32>,
    window: Option<usize>,
    stride: Option<usize>,
    confidence: Option<f64>,
    debounce: Option<u32>,
    model: Option<PathBuf>,
    bus: Option<u8>,
    address: Option<String>,
    no_emit: bool,
    emit_url: Option<String>,
    record: bool,
    duration: Option<u64>,
}

fn cmd_start(args: StartArgs) {
    println!("Drivesense Agent v{VERSION}");
    println!();

    // Merge CLI overrides into the stored configuration.
    let mut config = Config::load().unwrap_or_default();
    if let Some(rate) = args.sample_rate {
        config.sample_rate_hz = rate;
    }
    if let Some(window) = args.window {
        config.window_len = window;
    }
    if let Some(stride) = args.stride {
        config.stride = stride;
    }
    if let Some(confidence) = args.confidence {
        config.confidence_threshold = confidence;
    }
    if let Some(debounce) = args.debounce {
        config.debounce_count = debounce;
    }
    if args.model.is_some() {
        config.model_path = args.model.clone();
    }
    if let Some(bus) = args.bus {
        config.bus = bus;
    }
    if let Some(ref address) = args.address {
        match parse_address(address) {
            Ok(parsed) => config.address = parsed,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }
    if args.no_emit {
        config.emit_enabled = false;
    }
    if let Some(ref url) = args.emit_url {
        config.emit_url = url.clone();
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: could not create data directory: {e}");
    }

    // The model is loaded and checked against the extractor schema before
    // anything starts sampling. A configured artifact that is missing or
    // mismatched is fatal here.
    let schema = FeatureSchema::canonical();
    let classifier = match &config.model_path {
        Some(path) => match Classifier::load(path, &schema) {
            Ok(classifier) => classifier,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        None => match Classifier::reference(&schema) {
            Ok(classifier) => {
                println!("No model artifact configured, using the built-in reference model.");
                classifier
            }
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
    };

    let source = build_source(&args, &config);

    println!("Starting stream...");
    println!("  Source: {}", source.describe());
    println!("  Model: {}", classifier.origin());
    println!(
        "  Sampling: {} Hz, window {} samples, stride {}",
        config.sample_rate_hz, config.window_len, config.stride
    );
    println!(
        "  Decision: threshold {:.2}, debounce {}, stale after {}",
        config.confidence_threshold, config.debounce_count, config.stale_threshold
    );
    println!(
        "  Emission: {}",
        if config.emit_enabled {
            config.emit_url.as_str()
        } else {
            "disabled"
        }
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let stats = shared_stats_with_persistence(config.data_path.join("session_stats.json"));

    let settings = StreamSettings {
        sample_rate_hz: config.sample_rate_hz,
        window_len: config.window_len,
        stride: config.stride,
        max_gap_ms: config.max_gap_ms,
        decision: DecisionConfig {
            confidence_threshold: config.confidence_threshold,
            debounce_count: config.debounce_count,
            stale_threshold: config.stale_threshold,
        },
        sensor_fail_threshold: config.sensor_fail_threshold,
        brake_cooldown_ms: 2_000,
        max_ticks: args
            .duration
            .map(|secs| secs.saturating_mul(u64::from(config.sample_rate_hz))),
    };

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let mut controller = StreamController::new(
        settings,
        source,
        Arc::new(classifier),
        stats.clone(),
        running,
    );

    if config.emit_enabled {
        let emitter_config = EmitterConfig {
            url: config.emit_url.clone(),
            ..EmitterConfig::default()
        };
        match EmitterHandle::spawn(emitter_config, stats.clone()) {
            Ok(emitter) => controller = controller.with_emitter(emitter),
            Err(e) => eprintln!("Warning: continuing without emission: {e}"),
        }
    }

    if args.record {
        match SampleRecorder::create(&config.data_path) {
            Ok(recorder) => {
                println!("Recording samples to {:?}", recorder.path());
                controller = controller.with_recorder(recorder);
            }
            Err(e) => eprintln!("Warning: continuing without recording: {e}"),
        }
    }

    let report = match controller.run() {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    println!();
    println!("Stopping stream...");
    if let Some(verdict) = &report.last_verdict {
        println!("Last verdict: {}", verdict.message);
    }
    if let Some(path) = &report.summary_path {
        println!("Session summary saved to {path:?}");
    }
    if let Err(e) = stats.save() {
        eprintln!("Warning: could not save session stats: {e}");
    }
    println!();
    println!("{}", stats.summary());
}

/// Build the sample source the stream will read from.
fn build_source(args: &StartArgs, config: &Config) -> Box<dyn SampleSource> {
    match args.source {
        SourceKind::Synthetic => Box::new(SyntheticSource::default()),
        SourceKind::Replay => {
            let Some(path) = &args.replay_file else {
                eprintln!("Error: --source replay requires --replay-file");
                std::process::exit(1);
            };
            match ReplaySource::open(path) {
                Ok(source) => Box::new(source),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
        SourceKind::Mpu6050 => open_hardware_source(config),
    }
}

#[cfg(target_os = "linux")]
fn open_hardware_source(config: &Config) -> Box<dyn SampleSource> {
    use drivesense_agent::sensor::Mpu6050Source;
    match Mpu6050Source::open(config.bus, config.address) {
        Ok(source) => Box::new(source),
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!();
            eprintln!("Check that:");
            eprintln!("1. I2C is enabled on this machine");
            eprintln!("2. The sensor is wired to bus {}", config.bus);
            eprintln!("3. The address (0x{:02x}) matches the AD0 strap", config.address);
            std::process::exit(1);
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn open_hardware_source(_config: &Config) -> Box<dyn SampleSource> {
    eprintln!("Error: the mpu6050 source needs Linux I2C support.");
    eprintln!("Use --source synthetic or --source replay on this platform.");
    std::process::exit(1);
}

fn cmd_check(model: &std::path::Path, sample_rate: u32) {
    use drivesense_agent::FeatureExtractor;

    let extractor = FeatureExtractor::new(sample_rate);
    match Classifier::load(model, extractor.schema()) {
        Ok(classifier) => {
            println!("Model artifact OK: {:?}", model);
            println!("  Inputs: {} features", classifier.input_len());
            println!("  Classes: {}", classifier.classes().join(", "));
            println!("  Trees: {}", classifier.tree_count());
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Drivesense Agent Status");
    println!("=======================");
    println!();
    println!("Configuration:");
    println!("  Sampling: {} Hz", config.sample_rate_hz);
    println!(
        "  Window: {} samples, stride {}",
        config.window_len, config.stride
    );
    println!("  Confidence threshold: {:.2}", config.confidence_threshold);
    println!(
        "  Model: {}",
        config
            .model_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "builtin-reference".to_string())
    );
    println!(
        "  Emission: {}",
        if config.emit_enabled {
            config.emit_url.as_str()
        } else {
            "disabled"
        }
    );
    println!();

    let stats_path = config.data_path.join("session_stats.json");
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                if let Some(samples) = stats.get("samples_read") {
                    println!("  Samples read: {samples}");
                }
                if let Some(windows) = stats.get("windows_sealed") {
                    println!("  Windows sealed: {windows}");
                }
                if let Some(verdicts) = stats.get("verdicts") {
                    println!("  Verdicts: {verdicts}");
                }
                if let Some(events) = stats.get("events_emitted") {
                    println!("  Events emitted: {events}");
                }
            }
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}
