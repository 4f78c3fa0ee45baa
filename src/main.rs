//! Hedera Health ID command-line tool.
//!
//! Encodes and validates patient QR codes and manages the local file
//! registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hedera_health::adapters::qr::QrCodeRenderer;
use hedera_health::adapters::sanitize::SanitizingMakeWriter;
use hedera_health::adapters::sqlite::SqliteStore;
use hedera_health::application::UploadProgress;
use hedera_health::config::{self, AppConfig, LogMode};
use hedera_health::domain::{ErrorCorrection, QrOptions};
use hedera_health::{FileRegistry, LedgerGateway, PatientIdentity, QrCodec, UploadFile};

#[derive(Parser)]
#[command(name = "hedera-health")]
#[command(about = "Patient QR codes and local document registry for Hedera Health ID")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Patient identity QR codes
    #[command(subcommand)]
    Qr(QrCommand),
    /// Local file registry
    #[command(subcommand)]
    Files(FilesCommand),
}

#[derive(Subcommand)]
enum QrCommand {
    /// Seal a patient identity and render it as a PNG data URL
    Encode {
        #[command(flatten)]
        identity: IdentityArgs,
        #[command(flatten)]
        render: RenderArgs,
        /// Render at 128, 256 and 512 px instead of --width
        #[arg(long)]
        all_sizes: bool,
        /// Print the sealed text instead of an image
        #[arg(long, conflicts_with = "all_sizes")]
        text_only: bool,
        /// Also register the patient with the ledger contract
        #[arg(long)]
        register: bool,
    },
    /// Check a scanned payload for integrity, completeness and age
    Validate {
        /// Sealed text read from the QR code
        text: String,
    },
    /// Decrypt a scanned payload without freshness checks
    Decode {
        /// Sealed text read from the QR code
        text: String,
    },
}

#[derive(Args)]
struct IdentityArgs {
    #[arg(long)]
    patient_id: String,
    #[arg(long)]
    nom: String,
    #[arg(long)]
    prenom: String,
    #[arg(long)]
    hopital: String,
    #[arg(long)]
    date_naissance: Option<String>,
    #[arg(long)]
    groupe_sanguin: Option<String>,
    /// May be repeated
    #[arg(long = "allergy")]
    allergies: Vec<String>,
}

impl From<IdentityArgs> for PatientIdentity {
    fn from(args: IdentityArgs) -> Self {
        let mut identity =
            PatientIdentity::new(args.patient_id, args.nom, args.prenom, args.hopital);
        identity.date_naissance = args.date_naissance;
        identity.groupe_sanguin = args.groupe_sanguin;
        identity.allergies = (!args.allergies.is_empty()).then_some(args.allergies);
        identity
    }
}

#[derive(Args)]
struct RenderArgs {
    #[arg(long, default_value_t = 256)]
    width: u32,
    /// Quiet zone in modules
    #[arg(long, default_value_t = 2)]
    margin: u32,
    /// L, M, Q or H
    #[arg(long, default_value = "M")]
    error_correction: ErrorCorrection,
    #[arg(long, default_value = "#000000")]
    dark: String,
    #[arg(long, default_value = "#FFFFFF")]
    light: String,
}

impl From<RenderArgs> for QrOptions {
    fn from(args: RenderArgs) -> Self {
        Self {
            width: args.width,
            margin: args.margin,
            error_correction: args.error_correction,
            dark_color: args.dark,
            light_color: args.light,
        }
    }
}

#[derive(Subcommand)]
enum FilesCommand {
    /// Validate and catalogue files
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Owner of the uploaded files
        #[arg(long)]
        patient_id: Option<String>,
        /// Declared MIME type (guessed from the extension when omitted)
        #[arg(long)]
        mime_type: Option<String>,
    },
    /// Show one record
    Get { id: String },
    /// List records, optionally for one patient
    List {
        #[arg(long)]
        patient_id: Option<String>,
    },
    /// Remove a record
    Delete { id: String },
    /// Remove records older than the given number of days
    Cleanup {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Count and size of catalogued files
    Stats,
}

fn init_logging(mode: &LogMode) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let (writer, guard) = match mode {
        LogMode::File(path) => {
            if let Some(parent) = path.parent() {
                // Best-effort: a missing directory surfaces on open.
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_appender::non_blocking(file)
        }
        // Stdout carries command output.
        LogMode::Stderr => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    Ok(guard)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_codec() -> Result<QrCodec<QrCodeRenderer>> {
    let key = config::load_codec_key().context("Failed to load QR codec key")?;
    Ok(QrCodec::new(key, Arc::new(QrCodeRenderer::new())))
}

fn register_on_ledger(identity: &PatientIdentity, app_config: &AppConfig) -> Result<()> {
    let contract_id = app_config
        .ledger_contract_id
        .as_deref()
        .context("--register needs HEDERA_LEDGER_CONTRACT_ID")?;

    // No network client ships with the CLI; the gateway reports it.
    let gateway = LedgerGateway::unavailable();
    if let Err(e) = gateway.register_patient(contract_id, identity) {
        tracing::warn!("Ledger registration skipped: {}", e);
    }
    Ok(())
}

fn run_qr(command: QrCommand, app_config: &AppConfig) -> Result<()> {
    let codec = open_codec()?;

    match command {
        QrCommand::Encode {
            identity,
            render,
            all_sizes,
            text_only,
            register,
        } => {
            let identity = PatientIdentity::from(identity);
            if register {
                register_on_ledger(&identity, app_config)?;
            }
            if text_only {
                println!("{}", codec.seal(identity)?);
            } else if all_sizes {
                let images = codec.encode_multiple(identity)?;
                println!("small: {}", images.small);
                println!("medium: {}", images.medium);
                println!("large: {}", images.large);
            } else {
                println!("{}", codec.encode(identity, &QrOptions::from(render))?);
            }
        }
        QrCommand::Validate { text } => {
            let report = codec.validate(&text);
            print_json(&report)?;
            if let Some(error) = report.error {
                anyhow::bail!("QR payload rejected: {error}");
            }
        }
        QrCommand::Decode { text } => print_json(&codec.decode(&text)?)?,
    }
    Ok(())
}

fn read_upload(path: &Path, mime_type: Option<&str>) -> Result<UploadFile> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))?;
    Ok(UploadFile::new(name, mime_type.unwrap_or_default(), data))
}

fn run_files(command: FilesCommand, app_config: &AppConfig) -> Result<()> {
    let store = SqliteStore::new(&app_config.db_path).with_context(|| {
        format!("Failed to open registry at {}", app_config.db_path.display())
    })?;
    let registry = FileRegistry::new(Arc::new(store))
        .with_progress_interval(app_config.progress_interval);

    match command {
        FilesCommand::Upload {
            paths,
            patient_id,
            mime_type,
        } => {
            let files = paths
                .iter()
                .map(|path| read_upload(path, mime_type.as_deref()))
                .collect::<Result<Vec<_>>>()?;

            let mut on_progress = |progress: &UploadProgress| {
                eprintln!("{}: {}%", progress.file_name, progress.percent);
            };
            let batch = registry.upload(files, patient_id.as_deref(), Some(&mut on_progress))?;

            print_json(&batch.stored)?;
            for rejection in &batch.rejected {
                eprintln!("rejected {rejection}");
            }
            if !batch.rejected.is_empty() {
                anyhow::bail!("{} file(s) rejected", batch.rejected.len());
            }
        }
        FilesCommand::Get { id } => match registry.get(&id)? {
            Some(record) => print_json(&record)?,
            None => anyhow::bail!("No file with id {id}"),
        },
        FilesCommand::List { patient_id } => {
            let records = match patient_id {
                Some(patient_id) => registry.get_by_patient(&patient_id)?,
                None => registry.list()?,
            };
            print_json(&records)?;
        }
        FilesCommand::Delete { id } => {
            if !registry.delete(&id)? {
                anyhow::bail!("No file with id {id}");
            }
            println!("Deleted {id}");
        }
        FilesCommand::Cleanup { days } => {
            let removed = registry.cleanup_older_than(days)?;
            println!("Removed {removed} file(s) older than {days} day(s)");
        }
        FilesCommand::Stats => print_json(&registry.stats()?)?,
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let app_config = AppConfig::from_env()?;
    let _guard = init_logging(&app_config.log_mode)?;

    match cli.command {
        Commands::Qr(command) => run_qr(command, &app_config),
        Commands::Files(command) => run_files(command, &app_config),
    }
}
