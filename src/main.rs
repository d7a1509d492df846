// Command line entry point: translate a directory of pages, or inspect and
// edit the translation memory

use manga_translate::{
    collect_pages, BatchWorker, Config, Metrics, PagePipeline, TranslationMemory, WorkerEvent,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "manga-translate", version, about = "Translate the text in manga pages")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate every page in a directory
    Translate {
        /// Directory of page images (png, jpg, jpeg)
        #[arg(short, long)]
        input: PathBuf,
        /// Directory for the translated pages
        #[arg(short, long)]
        output: PathBuf,
        /// Service account / API key file for the translation service
        #[arg(long)]
        credentials: Option<PathBuf>,
    },
    /// Inspect or edit the translation memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
}

#[derive(Subcommand, Debug)]
enum MemoryAction {
    /// List entries, newest first
    List {
        /// Only entries whose source or translation contains this text
        #[arg(short, long, default_value = "")]
        search: String,
    },
    /// Number of stored entries
    Count,
    /// Replace a translation and mark it reviewed
    Update { source: String, translation: String },
    /// Remove one entry
    Delete { source: String },
    /// Remove every entry
    Flush {
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::new().context("Failed to load configuration")?;

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "manga_translate={},ort=off",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Translate {
            input,
            output,
            credentials,
        } => translate(config, input, output, credentials).await,
        Command::Memory { action } => memory(&config, action),
    }
}

async fn translate(
    config: Config,
    input: PathBuf,
    output: PathBuf,
    credentials: Option<PathBuf>,
) -> Result<()> {
    info!("=== MANGA PAGE TRANSLATOR ===");

    let pages = collect_pages(&input)?;
    if pages.is_empty() {
        warn!("No page images found in {}", input.display());
        return Ok(());
    }
    info!("{} pages: {} → {}", pages.len(), input.display(), output.display());

    let metrics = Metrics::new();
    let worker_metrics = metrics.clone();
    let (worker, mut rx) = BatchWorker::spawn(
        move || PagePipeline::new(&config, credentials.as_deref(), worker_metrics),
        pages,
        output,
    )?;

    let mut outcome = None;
    while outcome.is_none() {
        tokio::select! {
            event = rx.recv() => match event {
                Some(WorkerEvent::Log(line)) => info!("{}", line),
                Some(WorkerEvent::Progress(p)) => {
                    info!("Progress: {}/{} ({:.0}%)", p.completed, p.total, p.fraction * 100.0)
                }
                Some(WorkerEvent::Finished(result)) => outcome = Some(result),
                None => bail!("batch worker exited without reporting a result"),
            },
            _ = tokio::signal::ctrl_c(), if !worker.is_cancelled() => {
                warn!("Interrupted, finishing the current page...");
                worker.cancel();
            }
        }
    }

    worker.join()?;
    let summary = match outcome {
        Some(result) => result?,
        None => bail!("batch worker exited without reporting a result"),
    };

    info!("{}", "=".repeat(70));
    info!(
        "Done: {} translated, {} copied, {} failed of {}{}",
        summary.translated,
        summary.copied,
        summary.failed,
        summary.total,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    info!("{}", "=".repeat(70));
    println!("{}", serde_json::to_string_pretty(&metrics.snapshot())?);

    Ok(())
}

fn memory(config: &Config, action: MemoryAction) -> Result<()> {
    let store = TranslationMemory::open(&config.memory.db_path)?;

    match action {
        MemoryAction::List { search } => {
            for entry in store.fetch_all_entries(&search)? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    entry.id,
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.quality_score,
                    entry.source_text,
                    entry.translated_text
                );
            }
        }
        MemoryAction::Count => println!("{}", store.count_entries()?),
        MemoryAction::Update {
            source,
            translation,
        } => {
            if !store.update_translation(&source, &translation)? {
                warn!("No entry for '{}'", source);
            }
        }
        MemoryAction::Delete { source } => {
            if !store.delete_entry(&source)? {
                warn!("No entry for '{}'", source);
            }
        }
        MemoryAction::Flush { yes } => {
            if !yes {
                bail!("refusing to flush the translation memory without --yes");
            }
            store.flush_all()?;
            info!("Translation memory flushed");
        }
    }

    store.close();
    Ok(())
}
