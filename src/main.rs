mod api;
mod fetch;
mod inspect;
mod pipeline;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wamedia_core::config::{self, Config, StorageBackend};
use wamedia_core::shellexpand;
use wamedia_core::traits::MediaDecrypter;
use wamedia_evolution::EvolutionClient;
use wamedia_media::Classifier;
use wamedia_memory::Store;

use crate::api::ApiState;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::pipeline::Ingestor;

#[derive(Parser)]
#[command(
    name = "wamedia",
    version,
    about = "Evolution API media ingestion: classify, repair, sniff and re-host WhatsApp media"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml", env = "WAMEDIA_CONFIG")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook receiver and image proxy.
    Serve,
    /// Print the media kind a renderer would infer from a content string.
    Classify {
        /// Message content: text, URL, data-URI or raw base64.
        content: String,
    },
    /// Repair a double-encoded Firebase Storage URL.
    RepairUrl { url: String },
    /// Sniff the real type of a local file.
    Inspect { file: PathBuf },
    /// Show which media reference would be used for each message in a saved
    /// webhook body. Nothing is downloaded.
    Extract { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let cfg = config::load(&cli.config)?;
            let log_dir = Path::new(&shellexpand(&cfg.wamedia.data_dir)).join("logs");
            std::fs::create_dir_all(&log_dir)?;
            let _guard = init_tracing(&cfg.wamedia.log_level, Some(&log_dir));
            run_serve(cfg).await?;
        }
        Commands::Classify { content } => {
            init_tracing("warn", None);
            let cfg = config::load(&cli.config)?;
            let classifier = build_classifier(&cfg);
            print_json(&inspect::classify_report(&classifier, &content))?;
        }
        Commands::RepairUrl { url } => {
            init_tracing("warn", None);
            print_json(&inspect::repair_report(&url))?;
        }
        Commands::Inspect { file } => {
            init_tracing("warn", None);
            print_json(&inspect::inspect_file(&file)?)?;
        }
        Commands::Extract { file } => {
            init_tracing("warn", None);
            print_json(&inspect::extract_file(&file)?)?;
        }
    }

    Ok(())
}

/// Stderr logging, plus a daily rolling file when `log_dir` is given. The
/// returned guard must live as long as the process to flush the file writer.
fn init_tracing(default_level: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let stderr = fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "wamedia.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

/// Classifier that also recognizes our own S3 public host.
fn build_classifier(cfg: &Config) -> Classifier {
    let extra = match cfg.storage.backend {
        StorageBackend::S3 => cfg.storage.s3.public_host(),
        StorageBackend::Local => None,
    };
    Classifier::with_hosts(extra)
}

async fn run_serve(cfg: Config) -> anyhow::Result<()> {
    let media = wamedia_storage::build_store(&cfg.storage).await?;
    let records = Store::new(&cfg.memory).await?;
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::from_config(&cfg.fetch)?);
    let evolution = EvolutionClient::from_config(&cfg.evolution)?.map(Arc::new);
    let decrypter = evolution
        .clone()
        .map(|client| client as Arc<dyn MediaDecrypter>);

    info!(
        "{} starting: store={} evolution={}",
        cfg.wamedia.name,
        media.name(),
        if evolution.is_some() { "enabled" } else { "disabled" }
    );

    let ingestor = Ingestor::new(media, records, fetcher.clone(), decrypter);
    let state = ApiState {
        ingestor: Arc::new(ingestor),
        fetcher,
        classifier: Arc::new(build_classifier(&cfg)),
        proxy: cfg.proxy.clone(),
        evolution,
        webhook_secret: Some(cfg.api.webhook_secret.clone()).filter(|s| !s.is_empty()),
        body_limit: cfg.api.body_limit_bytes,
        uptime: Instant::now(),
    };

    let addr = format!("{}:{}", cfg.api.host, cfg.api.port);
    api::serve(&addr, state).await?;
    Ok(())
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
