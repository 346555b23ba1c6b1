mod config;
mod service;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use metadata_importer::Importer;
use metadata_importer::blob::BlobClient;
use metadata_store::StoreError;
use metrics_exporter_statsd::StatsdBuilder;
use service::{AutotagService, ServiceError};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use shared::metrics_defs::describe_all;
use shared::notify::{NoopNotifier, Notifier, NotifyError, SmtpNotifier};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const METRICS_PREFIX: &str = "autotag";

#[derive(Parser)]
#[command(name = "autotag", about = "Propagates application metadata onto Azure resource tags")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short)]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve resource change events and dataset uploads
    Serve,
    /// Import one AppId metadata dataset and exit
    Import(ImportArgs),
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ImportArgs {
    /// Local CSV file
    #[arg(long)]
    file: Option<PathBuf>,
    /// Blob path in the configured container, `<container>/<name>` or `<name>`
    #[arg(long)]
    blob: Option<String>,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not set up the metadata store: {0}")]
    Store(#[from] StoreError),
    #[error("could not set up notifications: {0}")]
    Notify(#[from] NotifyError),
    #[error(transparent)]
    Reconciler(#[from] tag_reconciler::TagReconcilerError),
    #[error("could not install metrics exporter: {0}")]
    Metrics(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("could not read dataset: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Import(#[from] metadata_importer::ImportError),
    #[error("no blob container configured under importer.blob")]
    MissingBlobConfig,
    #[error("one of --file or --blob is required")]
    MissingImportSource,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry = init_logging(config.logging.as_ref());

    if let Some(metrics) = &config.metrics
        && let Err(e) = init_metrics(metrics)
    {
        tracing::error!(error = %e, "Metrics are disabled");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Could not start runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            CliCommand::Serve => serve(config).await,
            CliCommand::Import(args) => import(config, args).await,
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "autotag failed");
            ExitCode::FAILURE
        }
    }
}

/// Sets up the tracing subscriber, reporting to Sentry when a DSN is configured.
fn init_logging(config: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = config
        .and_then(|logging| logging.sentry_dsn.as_deref())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });

    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    describe_all(tag_reconciler::metrics_defs::ALL_METRICS);
    describe_all(metadata_importer::metrics_defs::ALL_METRICS);
    describe_all(metadata_store::metrics_defs::ALL_METRICS);
    Ok(())
}

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>, CliError> {
    match &config.notifications {
        Some(smtp) => Ok(Arc::new(SmtpNotifier::new(smtp)?)),
        None => Ok(Arc::new(NoopNotifier)),
    }
}

async fn serve(config: Config) -> Result<(), CliError> {
    let store = metadata_store::from_config(&config.metadata_store)?;
    let notifier = build_notifier(&config)?;

    let events = tag_reconciler::from_config(&config.reconciler, store.clone(), notifier.clone())?;
    let importer = Importer::new(store, notifier);

    let main_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        AutotagService::new(events, importer),
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::<_, ServiceError>::new(|| true),
    );

    tokio::try_join!(main_task, admin_task)?;
    Ok(())
}

async fn import(config: Config, args: ImportArgs) -> Result<(), CliError> {
    let store = metadata_store::from_config(&config.metadata_store)?;
    let importer = Importer::new(store, build_notifier(&config)?);

    let summary = match (args.file, args.blob) {
        (Some(path), _) => {
            let body = tokio::fs::read(&path).await?;
            importer
                .import_bytes(&path.display().to_string(), &body)
                .await?
        }
        (None, Some(blob)) => {
            let blob_config = config
                .importer
                .blob
                .as_ref()
                .ok_or(CliError::MissingBlobConfig)?;
            importer
                .import_blob(&BlobClient::new(blob_config), &blob)
                .await?
        }
        (None, None) => return Err(CliError::MissingImportSource),
    };

    println!(
        "Imported {} records, skipped {} malformed rows",
        summary.upserted, summary.skipped
    );
    Ok(())
}
