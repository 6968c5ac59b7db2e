use anyhow::{Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand, ValueEnum};
use gads_client::ads::client::select_credentials;
use gads_client::ads::errors::decode_failure;
use gads_client::ads::http::{format_ads_error, TokenHttpClient};
use gads_client::config::AdsConfig;
use gads_client::request::case::snake_case_keys;
use gads_client::request::field_mask::field_mask;
use gads_client::request::{build_mutate_request, MutateOperation, MutateOptions, QueryBuilder};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Google Ads API helper
#[derive(Parser, Debug)]
#[command(name = "gads", version = gads_client::VERSION, about, long_about = None)]
struct Args {
    /// Path to google-ads.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch an access token with the configured credentials
    Token {
        /// Customer id whose refresh token to use (defaults to customer_id)
        #[arg(long)]
        customer_id: Option<String>,
    },
    /// Print the update mask of an entity JSON document
    FieldMask {
        /// JSON file, or - for stdin
        file: PathBuf,
    },
    /// Print the GoogleAdsService.Mutate body for a list of operations
    BuildMutate {
        /// JSON file holding an array of operations, or - for stdin
        file: PathBuf,
        #[arg(long)]
        customer_id: Option<String>,
        #[arg(long)]
        partial_failure: bool,
        #[arg(long)]
        validate_only: bool,
    },
    /// Assemble a GAQL query
    Gaql {
        /// Comma-separated field list
        #[arg(long, value_delimiter = ',', required = true)]
        select: Vec<String>,
        #[arg(long)]
        from: String,
        #[arg(long = "where")]
        conditions: Vec<String>,
        #[arg(long)]
        order_by: Option<String>,
        #[arg(long)]
        desc: bool,
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Decode a base64 GoogleAdsFailure payload
    DecodeFailure {
        /// Base64 payload of the googleadsfailure-bin metadata
        payload: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Cannot open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("gads started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("gads").join("gads.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".gads").join("gads.log");
    }
    PathBuf::from("gads.log")
}

fn read_json(path: &Path) -> Result<Value> {
    let content = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
    };
    serde_json::from_str(&content).context("Input is not valid JSON")
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Token { customer_id } => {
            let config = AdsConfig::load(args.config.as_deref())?;
            let client_options = config.client_options()?;
            let customer_options = config.customer_options(customer_id.as_deref())?;

            let credentials = select_credentials(&client_options, &customer_options, TokenHttpClient::new()?)
                .await
                .context("Failed to initialize credentials")?;
            let token = credentials.access_token().await?;

            tracing::info!("Fetched {} token", credentials.kind());
            println!("{}", token);
        }
        Command::FieldMask { file } => {
            let entity = snake_case_keys(read_json(&file)?);
            for path in field_mask(&entity).paths {
                println!("{}", path);
            }
        }
        Command::BuildMutate {
            file,
            customer_id,
            partial_failure,
            validate_only,
        } => {
            let operations: Vec<MutateOperation> =
                serde_json::from_value(read_json(&file)?).context("Expected an array of operations")?;
            let customer_id = match customer_id {
                Some(id) => id,
                None => AdsConfig::load(args.config.as_deref())?
                    .customer_id
                    .context("No customer id: pass --customer-id or set customer_id")?,
            };
            let customer_id = gads_client::ads::client::normalize_customer_id(&customer_id)?;

            let options = MutateOptions {
                partial_failure,
                validate_only,
                response_content_type: None,
            };
            print_json(&build_mutate_request(&customer_id, &operations, &options)?)?;
        }
        Command::Gaql {
            select,
            from,
            conditions,
            order_by,
            desc,
            limit,
        } => {
            let mut builder = QueryBuilder::new().select(select).from(&from);
            for condition in &conditions {
                builder = builder.where_clause(condition);
            }
            if let Some(field) = order_by {
                builder = builder.order_by(&field, desc);
            }
            if let Some(limit) = limit {
                builder = builder.limit(limit);
            }
            println!("{}", builder.build()?);
        }
        Command::DecodeFailure { payload } => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(payload.trim())
                .context("Payload is not valid base64")?;
            let failure = decode_failure(&bytes).context("Payload is not a GoogleAdsFailure")?;

            if !failure.request_id.is_empty() {
                println!("request-id: {}", failure.request_id);
            }
            for error in &failure.errors {
                let code = error
                    .kind()
                    .map(|(category, value)| format!("{}={}", category, value))
                    .unwrap_or_else(|| "unknown".to_string());
                let operation = error
                    .operation_index()
                    .map(|i| format!("operation {}", i))
                    .unwrap_or_else(|| "request".to_string());
                println!("[{}] {} ({}) {}", operation, code, error.field_path(), error.message);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    if let Err(err) = run(args).await {
        match err.downcast_ref::<gads_client::AdsError>() {
            Some(ads_error) => eprintln!("Error: {}", format_ads_error(ads_error)),
            None => eprintln!("Error: {err:?}"),
        }
        std::process::exit(1);
    }

    Ok(())
}
