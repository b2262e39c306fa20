use clap::Parser;
use miette::{IntoDiagnostic, Result};
use pix_reconciler::application::engine::{EngineSettings, ReconciliationEngine};
use pix_reconciler::application::scheduler;
use pix_reconciler::domain::clock::SystemClock;
use pix_reconciler::domain::ports::{ContactLogRepositoryRef, InstallmentRepositoryRef};
use pix_reconciler::infrastructure::http::build_client;
use pix_reconciler::infrastructure::http::messaging::{DEFAULT_COUNTRY_CODE, HttpMessenger};
use pix_reconciler::infrastructure::http::payment_gateway::{
    DEFAULT_GATEWAY_URL, HttpPaymentGateway,
};
use pix_reconciler::infrastructure::in_memory::{InMemoryContactLog, InMemoryInstallmentStore};
#[cfg(feature = "storage-rocksdb")]
use pix_reconciler::infrastructure::rocksdb::RocksDBStore;
use pix_reconciler::interfaces::csv::installment_reader::InstallmentReader;
use std::fs::File;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Installments CSV to load into the store before scanning
    #[arg(long, env = "SEED_CSV")]
    seed: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "DB_PATH")]
    db_path: Option<PathBuf>,

    /// Run a single scan and exit
    #[arg(long)]
    once: bool,

    /// Seconds between scans
    #[arg(long, env = "SCAN_INTERVAL_SECS", default_value_t = 30)]
    interval_secs: u64,

    /// Milliseconds between the two parts of a reminder
    #[arg(long, env = "DISPATCH_PAUSE_MS", default_value_t = 1000)]
    dispatch_pause_ms: u64,

    /// Seconds after a reminder before its payment is checked again
    #[arg(long, env = "RECHECK_DELAY_SECS", default_value_t = 30)]
    recheck_delay_secs: u64,

    /// Wait for pending re-checks on shutdown instead of abandoning them
    #[arg(long)]
    drain_on_shutdown: bool,

    /// Payment gateway base URL
    #[arg(long, env = "MP_API_URL", default_value = DEFAULT_GATEWAY_URL)]
    gateway_url: String,

    /// Payment gateway bearer token
    #[arg(long, env = "MP_ACCESS_TOKEN", hide_env_values = true)]
    gateway_token: String,

    /// Timeout for each payment gateway request, in seconds
    #[arg(long, env = "GATEWAY_TIMEOUT_SECS", default_value_t = 10)]
    gateway_timeout_secs: u64,

    /// Messaging channel base URL
    #[arg(long, env = "EVOLUTION_API_URL")]
    messaging_url: String,

    /// Messaging channel API key
    #[arg(long, env = "EVOLUTION_API_KEY", hide_env_values = true)]
    messaging_api_key: String,

    /// Messaging channel instance id
    #[arg(long, env = "INSTANCE_ID")]
    instance_id: String,

    /// Country calling code prefixed to contact numbers that lack one
    #[arg(long, env = "COUNTRY_CODE", default_value = DEFAULT_COUNTRY_CODE)]
    country_code: String,

    /// Timeout for each messaging request, in seconds
    #[arg(long, env = "MESSAGING_TIMEOUT_SECS", default_value_t = 10)]
    messaging_timeout_secs: u64,

    /// Skip TLS certificate verification for the messaging channel
    #[arg(long, env = "MESSAGING_INSECURE_TLS")]
    messaging_insecure_tls: bool,

    /// Log filter, e.g. "info" or "pix_reconciler=debug"
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal()),
        )
        .init();
}

fn in_memory_stores() -> (InstallmentRepositoryRef, ContactLogRepositoryRef) {
    (
        Arc::new(InMemoryInstallmentStore::new()),
        Arc::new(InMemoryContactLog::new()),
    )
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<(InstallmentRepositoryRef, ContactLogRepositoryRef)> {
    match db_path {
        Some(db_path) => {
            // Use persistent storage (RocksDB)
            let store = RocksDBStore::open(&db_path).into_diagnostic()?;
            info!(path = %db_path.display(), "using RocksDB storage");
            Ok((Arc::new(store.clone()), Arc::new(store)))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<(InstallmentRepositoryRef, ContactLogRepositoryRef)> {
    if db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}

async fn seed(installments: &InstallmentRepositoryRef, path: PathBuf) -> Result<()> {
    let file = File::open(&path).into_diagnostic()?;
    let reader = InstallmentReader::new(file, chrono::Utc::now());
    let mut loaded = 0usize;
    for record in reader.records() {
        match record {
            Ok(record) => match installments.provision(record).await {
                Ok(()) => loaded += 1,
                Err(e) => error!(error = %e, "Error storing installment"),
            },
            Err(e) => error!(error = %e, "Error reading installment"),
        }
    }
    info!(path = %path.display(), loaded, "seed loaded");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let (installments, contact_log) = open_stores(cli.db_path)?;
    if let Some(path) = cli.seed {
        seed(&installments, path).await?;
    }

    let gateway_client =
        build_client(Duration::from_secs(cli.gateway_timeout_secs), false).into_diagnostic()?;
    if cli.messaging_insecure_tls {
        warn!("TLS certificate verification is disabled for the messaging channel");
    }
    let messaging_client = build_client(
        Duration::from_secs(cli.messaging_timeout_secs),
        cli.messaging_insecure_tls,
    )
    .into_diagnostic()?;

    let gateway = HttpPaymentGateway::new(gateway_client, cli.gateway_url, cli.gateway_token);
    let messenger = HttpMessenger::new(
        messaging_client,
        cli.messaging_url,
        cli.messaging_api_key,
        cli.instance_id,
    )
    .with_country_code(cli.country_code);

    let engine = ReconciliationEngine::new(
        installments,
        contact_log,
        Arc::new(gateway),
        Arc::new(messenger),
        Arc::new(SystemClock),
    )
    .with_settings(EngineSettings {
        dispatch_pause: Duration::from_millis(cli.dispatch_pause_ms),
        recheck_delay: Duration::from_secs(cli.recheck_delay_secs),
    });

    if cli.once {
        scheduler::run_once(&engine).await;
    } else {
        info!(interval_secs = cli.interval_secs, "starting periodic scans");
        scheduler::run_periodic(
            &engine,
            Duration::from_secs(cli.interval_secs.max(1)),
            async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "failed to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
            },
        )
        .await;
    }

    engine.rechecks().shutdown(cli.drain_on_shutdown).await;
    Ok(())
}
