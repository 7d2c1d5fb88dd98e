//! Fusion CLI - Command-line interface for Synheart Fusion
//!
//! Commands:
//! - check: Train on baselines and flag a user bundle
//! - fuse: Train on baselines and print the fused table for a user bundle
//! - score: Score one modality batch against its baseline
//! - doctor: Diagnose configuration and baseline files

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use synheart_fusion::dataset;
use synheart_fusion::features::ModalityEvent;
use synheart_fusion::{
    AnomalyDetector, AppUsageEvent, CsvAppendLog, EventBatch, FusedRecord, FusionConfig,
    FusionError, Modality, ModalityScorer, ScoredRecord, SensorEvent, TypingEvent, UserBundle,
    FUSION_VERSION, PRODUCER_NAME,
};

/// Fusion - Multi-modal behavioral anomaly detection
#[derive(Parser)]
#[command(name = "fusion")]
#[command(author = "Synheart AI Inc")]
#[command(version = FUSION_VERSION)]
#[command(about = "Fuse behavioral anomaly scores into one decision", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DetectorArgs {
    /// Detector configuration JSON (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Typing baseline (csv, json or ndjson)
    #[arg(long)]
    typing_baseline: Option<PathBuf>,

    /// App-usage baseline (csv, json or ndjson)
    #[arg(long)]
    app_baseline: Option<PathBuf>,

    /// Sensor baseline (csv, json or ndjson)
    #[arg(long)]
    sensor_baseline: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Flag the most recent record of a user bundle
    Check {
        #[command(flatten)]
        detector: DetectorArgs,

        /// User bundle JSON (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the fused table for a user bundle
    Fuse {
        #[command(flatten)]
        detector: DetectorArgs,

        /// User bundle JSON (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format (ndjson prints fused rows, json formats print the report)
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Append fused rows to this CSV log
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Score one modality batch against its baseline
    Score {
        /// Modality of both files
        #[arg(short, long)]
        modality: String,

        /// Baseline events (csv, json or ndjson)
        #[arg(short, long)]
        baseline: PathBuf,

        /// Events to score (use - for CSV on stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Detector configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Append scored rows to this CSV log
        #[arg(long)]
        log: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Diagnose configuration and baseline files
    Doctor {
        #[command(flatten)]
        detector: DetectorArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one row per line)
    Ndjson,
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), FusionCliError> {
    match cli.command {
        Commands::Check { detector, input } => cmd_check(&detector, &input),

        Commands::Fuse {
            detector,
            input,
            output,
            output_format,
            log,
        } => cmd_fuse(&detector, &input, &output, output_format, log.as_deref()),

        Commands::Score {
            modality,
            baseline,
            input,
            config,
            log,
            output_format,
        } => {
            let modality: Modality = modality.parse()?;
            let config = load_config(config.as_deref())?;
            let scored = match modality {
                Modality::Typing => {
                    score_file::<TypingEvent>(&config, &baseline, &input, log.as_deref())?
                }
                Modality::App => {
                    score_file::<AppUsageEvent>(&config, &baseline, &input, log.as_deref())?
                }
                Modality::Sensor => {
                    score_file::<SensorEvent>(&config, &baseline, &input, log.as_deref())?
                }
            };
            print!("{}", format_output(&scored, &output_format)?);
            Ok(())
        }

        Commands::Doctor { detector, json } => cmd_doctor(&detector, json),
    }
}

fn cmd_check(args: &DetectorArgs, input: &Path) -> Result<(), FusionCliError> {
    let detector = build_detector(args)?;
    let bundle = read_bundle(input)?;

    let response = detector.check(bundle, chrono::Utc::now())?;
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

fn cmd_fuse(
    args: &DetectorArgs,
    input: &Path,
    output: &Path,
    output_format: OutputFormat,
    log: Option<&Path>,
) -> Result<(), FusionCliError> {
    let detector = build_detector(args)?;
    let bundle = read_bundle(input)?;
    let report = detector.report(bundle, chrono::Utc::now())?;

    if let Some(log_path) = log {
        CsvAppendLog::new(log_path).append_fused(&report.rows)?;
        info!(path = %log_path.display(), rows = report.rows.len(), "fused rows appended");
    }

    let output_data = match output_format {
        OutputFormat::Ndjson => format_output::<FusedRecord>(&report.rows, &output_format)?,
        OutputFormat::Json => serde_json::to_string(&report)? + "\n",
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&report)? + "\n",
    };

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }
    Ok(())
}

fn score_file<E: ModalityEvent + DeserializeOwned>(
    config: &FusionConfig,
    baseline: &Path,
    input: &Path,
    log: Option<&Path>,
) -> Result<Vec<ScoredRecord>, FusionCliError> {
    let mut scorer = ModalityScorer::<E>::new(config.reference_user.clone(), config.model.build()?);
    scorer.train(&dataset::load_records::<E>(baseline)?)?;

    let batch: Vec<E> = if input.to_string_lossy() == "-" {
        dataset::read_csv(io::stdin().lock())?
    } else {
        dataset::load_records(input)?
    };

    let scored = match log {
        Some(log_path) => scorer.score_and_log(&batch, &CsvAppendLog::new(log_path))?,
        None => scorer.score(&batch)?,
    };
    Ok(scored)
}

fn cmd_doctor(args: &DetectorArgs, json: bool) -> Result<(), FusionCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "fusion_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Fusion version {}", FUSION_VERSION),
    });

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: match &args.config {
                    Some(path) => format!("Configuration valid ({})", path.display()),
                    None => "Using default configuration".to_string(),
                },
            });
            config
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            });
            FusionConfig::default()
        }
    };

    checks.push(check_baseline::<TypingEvent>(
        args.typing_baseline.as_deref(),
        &config.reference_user,
    ));
    checks.push(check_baseline::<AppUsageEvent>(
        args.app_baseline.as_deref(),
        &config.reference_user,
    ));
    checks.push(check_baseline::<SensorEvent>(
        args.sensor_baseline.as_deref(),
        &config.reference_user,
    ));

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (bundle input ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FUSION_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Fusion Doctor Report");
        println!("====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(FusionCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_baseline<E: ModalityEvent + DeserializeOwned>(
    path: Option<&Path>,
    reference_user: &str,
) -> DoctorCheck {
    let name = format!("{}_baseline", E::MODALITY);

    let Some(path) = path else {
        return DoctorCheck {
            name,
            status: CheckStatus::Warning,
            message: format!("No baseline given; {} scorer stays untrained", E::MODALITY),
        };
    };

    match dataset::load_records::<E>(path) {
        Ok(events) => {
            let reference = events.iter().filter(|e| e.user() == reference_user).count();
            if reference == 0 {
                DoctorCheck {
                    name,
                    status: CheckStatus::Warning,
                    message: format!(
                        "{} events, none for reference user '{}'",
                        events.len(),
                        reference_user
                    ),
                }
            } else {
                DoctorCheck {
                    name,
                    status: CheckStatus::Ok,
                    message: format!(
                        "{} events ({} for reference user '{}')",
                        events.len(),
                        reference,
                        reference_user
                    ),
                }
            }
        }
        Err(e) => DoctorCheck {
            name,
            status: CheckStatus::Error,
            message: format!("Cannot load {}: {}", path.display(), e),
        },
    }
}

// Helper functions

fn load_config(path: Option<&Path>) -> Result<FusionConfig, FusionCliError> {
    match path {
        Some(path) => Ok(FusionConfig::from_file(path)?),
        None => Ok(FusionConfig::default()),
    }
}

fn build_detector(args: &DetectorArgs) -> Result<AnomalyDetector, FusionCliError> {
    let config = load_config(args.config.as_deref())?;

    let baseline = EventBatch {
        typing: load_optional(args.typing_baseline.as_deref())?,
        app_usage: load_optional(args.app_baseline.as_deref())?,
        sensor: load_optional(args.sensor_baseline.as_deref())?,
    };
    if baseline.is_empty() {
        return Err(FusionCliError::NoBaseline);
    }

    let detector = AnomalyDetector::train(config, &baseline)?;
    info!(ready = ?detector.ready_modalities(), "detector trained");
    Ok(detector)
}

fn load_optional<T: DeserializeOwned>(path: Option<&Path>) -> Result<Vec<T>, FusionCliError> {
    match path {
        Some(path) => Ok(dataset::load_records(path)?),
        None => Ok(Vec::new()),
    }
}

fn read_bundle(input: &Path) -> Result<UserBundle, FusionCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };
    Ok(UserBundle::from_json(&input_data)?)
}

fn format_output<T: Serialize>(rows: &[T], format: &OutputFormat) -> Result<String, FusionCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut out = String::new();
            for row in rows {
                out.push_str(&serde_json::to_string(row)?);
                out.push('\n');
            }
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string(rows)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(rows)? + "\n"),
    }
}

// Error types

#[derive(Debug)]
enum FusionCliError {
    Io(io::Error),
    Fusion(FusionError),
    Json(serde_json::Error),
    NoBaseline,
    DoctorFailed,
}

impl From<io::Error> for FusionCliError {
    fn from(e: io::Error) -> Self {
        FusionCliError::Io(e)
    }
}

impl From<FusionError> for FusionCliError {
    fn from(e: FusionError) -> Self {
        FusionCliError::Fusion(e)
    }
}

impl From<serde_json::Error> for FusionCliError {
    fn from(e: serde_json::Error) -> Self {
        FusionCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FusionCliError> for CliError {
    fn from(e: FusionCliError) -> Self {
        match e {
            FusionCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FusionCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FusionCliError::NoBaseline => CliError {
                code: "NO_BASELINE".to_string(),
                message: "No baseline events given".to_string(),
                hint: Some(
                    "Pass at least one of --typing-baseline, --app-baseline, --sensor-baseline"
                        .to_string(),
                ),
            },
            FusionCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            FusionCliError::Fusion(e) => {
                let (code, hint) = match &e {
                    FusionError::InsufficientData(_) => (
                        "INSUFFICIENT_DATA",
                        "Baseline needs events for the reference user",
                    ),
                    FusionError::NotTrained(_) => (
                        "NOT_TRAINED",
                        "Provide a baseline for every modality in the input",
                    ),
                    FusionError::InvalidRecord { .. } => {
                        ("INVALID_RECORD", "Fix the reported record and retry")
                    }
                    FusionError::InvalidConfig(_) => {
                        ("INVALID_CONFIG", "Run 'fusion doctor --config <path>'")
                    }
                    FusionError::ParseError(_) | FusionError::JsonError(_) => {
                        ("PARSE_ERROR", "Check input format")
                    }
                    FusionError::CsvError(_) => ("CSV_ERROR", "Check CSV columns and values"),
                    FusionError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
        }
    }
}

// Report types

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
