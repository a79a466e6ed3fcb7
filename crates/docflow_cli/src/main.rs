//! Command-line front end for the docflow engine.
//!
//! # Responsibility
//! - Open the configured database and run one workflow command per call.
//! - Print results as JSON on stdout; failures go to stderr with a non-zero
//!   exit code.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use docflow_core::db::{open_db_in_memory, open_db_with_timeout};
use docflow_core::{
    core_version, init_logging, logging_status, CarrierLocks, DocflowConfig, DocumentService,
    DocumentSubmission, EngineError, LoggingConfig, MovementEngine, MovementFilter, MovementKind,
    MovementOrder, PageRequest, SqliteOutboxPublisher, SqliteWorkflowStore,
};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Exit code for failures worth retrying (carrier busy).
const EXIT_TEMPFAIL: u8 = 75;

#[derive(Parser)]
#[command(
    name = "docflow",
    version,
    about = "Document carrier workflow engine",
    propagate_version = true
)]
struct Cli {
    /// SQLite database file; overrides `database_path` from the config file
    #[arg(long, global = true, env = "DOCFLOW_DB")]
    db: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true, env = "DOCFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for rolling log files
    #[arg(long, global = true, env = "DOCFLOW_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a document and its carrier
    Register(RegisterArgs),
    /// Sign a carrier with the signer's password
    Sign(SignerArgs),
    /// Add a cosignatory to a carrier
    Cosign(RecipientArgs),
    /// Route a finalized carrier to a recipient
    Route(RecipientArgs),
    /// Finalize a carrier
    Finalize(SignerArgs),
    /// Cancel a movement by id
    Cancel { id: i64 },
    /// Show a carrier with its movement history
    Show { carrier: String },
    /// Show one movement by id
    Movement { id: i64 },
    /// List movements
    List(ListArgs),
    /// Print version information
    Version,
}

#[derive(Args)]
struct RegisterArgs {
    #[arg(long)]
    title: String,
    #[arg(long, default_value = "")]
    content: String,
    /// Carrier code; generated when omitted
    #[arg(long)]
    carrier: Option<String>,
    #[arg(long)]
    subscriber: i64,
}

#[derive(Args)]
struct SignerArgs {
    /// Carrier code or current status code
    carrier: String,
    #[arg(long)]
    signer: i64,
}

#[derive(Args)]
struct RecipientArgs {
    /// Carrier code or current status code
    carrier: String,
    #[arg(long)]
    signer: i64,
    #[arg(long)]
    recipient: i64,
}

#[derive(Args)]
struct ListArgs {
    /// Restrict to one carrier
    #[arg(long)]
    carrier: Option<String>,
    #[arg(long, value_enum)]
    kind: Option<KindArg>,
    #[arg(long)]
    subscriber: Option<i64>,
    #[arg(long)]
    recipient: Option<i64>,
    #[arg(long)]
    include_cancelled: bool,
    #[arg(long, value_enum, default_value = "carrier")]
    order: OrderArg,
    #[arg(long, default_value_t = 0)]
    page: u32,
    #[arg(long)]
    size: Option<u32>,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Sign,
    Cosign,
    Route,
    Finalize,
}

impl From<KindArg> for MovementKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Sign => Self::SignWithPassword,
            KindArg::Cosign => Self::AddCosignatory,
            KindArg::Route => Self::Route,
            KindArg::Finalize => Self::Finalize,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderArg {
    Carrier,
    Chronological,
    Newest,
}

impl From<OrderArg> for MovementOrder {
    fn from(value: OrderArg) -> Self {
        match value {
            OrderArg::Carrier => Self::CarrierInsertion,
            OrderArg::Chronological => Self::Chronological,
            OrderArg::Newest => Self::NewestFirst,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => {
            println!("{output:#}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let retryable = err
                .downcast_ref::<EngineError>()
                .is_some_and(EngineError::is_retryable);
            eprintln!("error: {err:#}");
            if retryable {
                ExitCode::from(EXIT_TEMPFAIL)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> Result<Value> {
    let config = match &cli.config {
        Some(path) => DocflowConfig::load(path)?,
        None => DocflowConfig::default(),
    };

    let logging = match (&cli.log_dir, &config.logging) {
        (Some(dir), Some(configured)) => Some(LoggingConfig {
            log_dir: dir.clone(),
            ..configured.clone()
        }),
        (Some(dir), None) => Some(LoggingConfig::new(docflow_core::default_log_level(), dir)),
        (None, configured) => configured.clone(),
    };
    if let Some(logging) = &logging {
        init_logging(logging).map_err(|err| anyhow!("failed to initialize logging: {err}"))?;
    }

    if let Commands::Version = cli.command {
        return Ok(json!({
            "version": core_version(),
            "logging": logging_status().map(|(level, dir)| json!({
                "level": level,
                "log_dir": dir,
            })),
        }));
    }

    let conn = open_connection(cli.db.or(config.database_path.clone()), &config)?;
    info!("event=cli_command module=cli status=start");
    execute(cli.command, &conn, &config)
}

fn open_connection(path: Option<PathBuf>, config: &DocflowConfig) -> Result<Connection> {
    match path {
        Some(path) => open_db_with_timeout(&path, config.engine.busy_timeout())
            .with_context(|| format!("failed to open database {}", path.display())),
        None => open_db_in_memory().context("failed to open in-memory database"),
    }
}

fn execute(command: Commands, conn: &Connection, config: &DocflowConfig) -> Result<Value> {
    let engine = MovementEngine::new(
        SqliteWorkflowStore::try_new(conn)?,
        Arc::new(CarrierLocks::new()),
        config.engine.clone(),
    );

    let output = match command {
        Commands::Register(args) => {
            let service = DocumentService::new(
                SqliteWorkflowStore::try_new(conn)?,
                SqliteOutboxPublisher::new(conn),
            );
            let submission = DocumentSubmission {
                title: args.title,
                content: args.content,
                carrier_code: args.carrier,
            };
            serde_json::to_value(service.register(&submission, args.subscriber)?)?
        }
        Commands::Sign(args) => {
            serde_json::to_value(engine.sign_with_password(&args.carrier, args.signer)?)?
        }
        Commands::Cosign(args) => serde_json::to_value(engine.add_cosignatory(
            &args.carrier,
            args.signer,
            args.recipient,
        )?)?,
        Commands::Route(args) => {
            serde_json::to_value(engine.route(&args.carrier, args.signer, args.recipient)?)?
        }
        Commands::Finalize(args) => {
            serde_json::to_value(engine.finalize(&args.carrier, args.signer)?)?
        }
        Commands::Cancel { id } => serde_json::to_value(engine.cancel_movement(id)?)?,
        Commands::Show { carrier } => serde_json::to_value(engine.find_carrier(&carrier)?)?,
        Commands::Movement { id } => serde_json::to_value(engine.lookup_by_id(id)?)?,
        Commands::List(args) => {
            let carrier_id = match &args.carrier {
                Some(code) => Some(engine.find_carrier(code)?.id),
                None => None,
            };
            let filter = MovementFilter {
                carrier_id,
                kind: args.kind.map(MovementKind::from),
                subscriber_id: args.subscriber,
                recipient_id: args.recipient,
                include_cancelled: args.include_cancelled,
                order: args.order.into(),
                ..MovementFilter::default()
            };
            let page = engine.list(
                &filter,
                PageRequest {
                    page: args.page,
                    size: args.size,
                },
            )?;
            json!({
                "items": page.items,
                "page": page.page,
                "size": page.size,
                "total_items": page.total_items,
                "total_pages": page.total_pages(),
                "has_next": page.has_next(),
            })
        }
        Commands::Version => json!({ "version": core_version() }),
    };

    Ok(output)
}
