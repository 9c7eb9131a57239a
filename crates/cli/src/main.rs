use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use capture::{
    ArtifactNaming, CaptureConfig, CaptureServices, ChunkCache, ChunkExecManager, ConsoleRecorder,
    DetachedEngine, NoWidgetCapture, NotifyWatchService, CONFIG_FILE,
};
use clap::{Parser, Subcommand};
use events::{ConsoleEvents, ConsoleOutput, Notification, NotificationBus};
use notebook_core::ChunkKey;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "notebook-capture")]
#[command(about = "Capture notebook chunk output into a chunk cache", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file, relative to the current directory
    #[arg(short, long, default_value = CONFIG_FILE, global = true)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init,
    /// Show the cached outputs and console log of a chunk
    Inspect {
        document: String,
        chunk: String,

        #[arg(long)]
        json: bool,
    },
    /// Capture a chunk run: stdin lines become console output, and EOF or
    /// Ctrl+C ends the run
    Watch { document: String, chunk: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => init_config(&cli.config).await,
        Commands::Inspect {
            document,
            chunk,
            json,
        } => inspect(&cli.config, &document, &chunk, json).await,
        Commands::Watch { document, chunk } => watch(&cli.config, &document, &chunk).await,
    }
}

async fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }

    let config = CaptureConfig::default();
    config
        .write(path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Created {}", path.display());
    println!();
    println!("  cache root:  {}", config.cache_root.display());
    println!("  context id:  {}", config.context_id);
    println!(
        "  plot files:  {}###.{}",
        config.naming.prefix, config.naming.extension
    );
    Ok(())
}

async fn inspect(config_path: &Path, document: &str, chunk: &str, json: bool) -> Result<()> {
    let config = CaptureConfig::read(config_path).await;
    let key = ChunkKey::new(document, chunk).context("Invalid chunk key")?;
    let cache = ChunkCache::new(&config.cache_root);

    let outputs = cache
        .outputs(&key)
        .with_context(|| format!("Failed to list outputs of {}", key))?;
    let console_log = cache.console_log(&key);
    let records = if console_log.exists() {
        ConsoleRecorder::read_records(&console_log)
            .with_context(|| format!("Failed to read {}", console_log.display()))?
    } else {
        Vec::new()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
        return Ok(());
    }

    println!();
    println!("Chunk:   {}", key);
    println!("Cache:   {}", cache.chunk_dir(&key).display());
    println!();

    if outputs.is_empty() {
        println!("No cached outputs.");
    } else {
        println!("Outputs ({}):", outputs.len());
        for output in &outputs {
            println!(
                "  {:>6}  {:<5} {}",
                output.ordinal,
                output.output_type.as_str(),
                output.path.display()
            );
        }
    }

    println!();
    if records.is_empty() {
        println!("No console output.");
    } else {
        println!("Console ({} records):", records.len());
        for record in &records {
            let marker = match record.channel {
                notebook_core::ChannelType::Input => ">",
                notebook_core::ChannelType::Output => " ",
                notebook_core::ChannelType::Error => "!",
            };
            for line in record.text.lines() {
                println!("  {} {}", marker, line);
            }
        }
    }
    println!();

    Ok(())
}

async fn watch(config_path: &Path, document: &str, chunk: &str) -> Result<()> {
    init_tracing();

    let config = CaptureConfig::read(config_path).await;
    let key = ChunkKey::new(document, chunk).context("Invalid chunk key")?;
    let naming = ArtifactNaming::new(&config.naming).context("Invalid plot naming")?;
    let output_dir = ChunkCache::new(&config.cache_root).chunk_dir(&key);

    let bus = NotificationBus::new();
    let mut notifications = bus.subscribe();
    let services = CaptureServices {
        engine: Arc::new(DetachedEngine),
        watcher: Arc::new(NotifyWatchService::new()),
        widgets: Arc::new(NoWidgetCapture),
        bus,
    };
    let manager = ChunkExecManager::new(config, ConsoleEvents::new(), services);

    let printer = tokio::spawn(async move {
        while let Ok(envelope) = notifications.recv().await {
            match serde_json::to_string(&envelope) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Failed to serialize notification: {}", e),
            }
            if let Notification::ExecutionCompleted { .. } = envelope.notification {
                break;
            }
        }
    });

    let session = manager
        .start(key.clone())
        .await
        .with_context(|| format!("Failed to start capture for {}", key))?;

    eprintln!("Capturing {}", key);
    eprintln!("  plots:  {}", naming.file_template(&output_dir));
    eprintln!("Press Ctrl+C or close stdin to finish");

    let console = manager.console().clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let interrupted = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break true,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    console.output.emit(&ConsoleOutput::normal(format!("{}\n", line)));
                }
                Ok(None) => break false,
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    break false;
                }
            },
        }
    };

    if interrupted {
        manager.cancel(&key);
    } else {
        console.prompt.emit(&"> ".to_string());
    }
    session.await.context("Capture session failed")?;
    printer.await.context("Notification printer failed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notebook_capture=info,capture=info".into()),
        )
        .init();
}
