use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;

use endpoint_indexer::config::EngineConfig;
use endpoint_indexer::engine::{DiscoveryEngine, EngineEvent};
use endpoint_indexer::extractor::Endpoint;
use endpoint_indexer::manifest::Manifest;

#[derive(Parser)]
#[command(name = "endpoint-indexer")]
#[command(about = "Discover HTTP API endpoints across web frameworks")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Discover endpoints of the current directory
    endpoint-indexer discover

    # Same, as JSON
    endpoint-indexer discover ./api --format json

    # Keep the manifest up to date while files change
    endpoint-indexer watch ./api

    # Print the last persisted manifest
    endpoint-indexer manifest ./api

    # Show detected frameworks and their evidence
    endpoint-indexer frameworks ./api
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Debounce window for watch mode, in milliseconds
    #[arg(long, default_value = "150", global = true)]
    pub debounce_ms: u64,

    /// Minimum confidence for a framework detection, between 0 and 1
    #[arg(long, default_value = "0.5", global = true, value_parser = parse_threshold)]
    pub threshold: f64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a full discovery and write the manifest
    Discover {
        /// Project root
        #[arg(default_value = ".")]
        path: PathBuf,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Watch a project and print updates until interrupted
    Watch {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Print the persisted manifest
    Manifest {
        #[arg(default_value = ".")]
        path: PathBuf,

        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// List detected frameworks per analysis root
    Frameworks {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

fn parse_threshold(value: &str) -> Result<f64, String> {
    let threshold: f64 = value
        .parse()
        .map_err(|e| format!("'{}' is not a number: {}", value, e))?;
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(format!("'{}' must be between 0 and 1", value));
    }
    Ok(threshold)
}

impl Cli {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_debounce(std::time::Duration::from_millis(self.debounce_ms))
            .with_threshold(self.threshold)
    }
}

pub async fn discover(engine: &DiscoveryEngine, path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let endpoints = engine.discover(path).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&endpoints)?),
        OutputFormat::Table => print_table(&endpoints),
    }
    Ok(())
}

pub async fn watch(engine: &DiscoveryEngine, path: &Path) -> anyhow::Result<()> {
    let mut events = engine.subscribe();
    let session_id = engine.start_watching(path).await?;
    if let Some(manifest) = engine.read_manifest(path)? {
        print_summary(&manifest);
    }
    println!("Watching {} (session {}), Ctrl-C to stop", path.display(), session_id);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(EngineEvent::FileChanged { source, kind, diff, .. }) => {
                    println!(
                        "{:?} {}: +{} -{} ~{}",
                        kind,
                        source.display(),
                        diff.added.len(),
                        diff.removed.len(),
                        diff.modified.len()
                    );
                }
                Ok(EngineEvent::EndpointsUpdated { endpoints, .. }) => {
                    println!("Endpoints updated: {} total", endpoints.len());
                }
                Ok(EngineEvent::WatchFailed { error, .. }) => {
                    eprintln!("Watching stopped: {}", error);
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!("Missed {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.stop_watching(&session_id).await;
    engine.shutdown().await;
    Ok(())
}

pub fn manifest(engine: &DiscoveryEngine, path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    match engine.read_manifest(path)? {
        None => println!("No manifest yet; run `endpoint-indexer discover` first"),
        Some(manifest) => match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(manifest.as_ref())?),
            OutputFormat::Table => {
                print_summary(&manifest);
                println!();
                print_table(&manifest.endpoints);
            }
        },
    }
    Ok(())
}

pub async fn frameworks(engine: &DiscoveryEngine, path: &Path) -> anyhow::Result<()> {
    let detections = engine.detections(path).await?;
    if detections.is_empty() {
        println!("No frameworks detected");
        return Ok(());
    }

    for detection in detections {
        println!(
            "{} in {} (confidence {:.2})",
            detection.framework.display_name(),
            detection.root.display(),
            detection.confidence
        );
        for signal in &detection.signals {
            println!(
                "  {} {} ({:.2}) from {}",
                signal.kind.as_str(),
                signal.value,
                signal.confidence,
                signal.source.display()
            );
        }
    }
    Ok(())
}

fn print_summary(manifest: &Manifest) {
    println!(
        "Manifest {} updated {}: {} endpoints",
        manifest.version, manifest.last_updated, manifest.statistics.total
    );
    for (method, count) in &manifest.statistics.by_method {
        println!("  {}: {}", method, count);
    }
}

fn print_table(endpoints: &[Endpoint]) {
    if endpoints.is_empty() {
        println!("No endpoints found");
        return;
    }

    let path_width = endpoints
        .iter()
        .map(|e| e.path.len())
        .max()
        .unwrap_or(4)
        .max(4);
    println!("{:<7} {:<width$} {:<9} LOCATION", "METHOD", "PATH", "FRAMEWORK", width = path_width);
    for endpoint in endpoints {
        let location = format!(
            "{}:{}:{}",
            endpoint.handler.file, endpoint.handler.line, endpoint.handler.column
        );
        let handler = endpoint
            .handler
            .handler
            .as_deref()
            .map(|h| format!(" ({})", h))
            .unwrap_or_default();
        println!(
            "{:<7} {:<width$} {:<9} {}{}",
            endpoint.method.as_str(),
            endpoint.path,
            endpoint.framework.as_str(),
            location,
            handler,
            width = path_width
        );
    }
    println!("\n{} endpoints", endpoints.len());
}
