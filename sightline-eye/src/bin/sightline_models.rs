//! Binary for listing and downloading detection models from the command line

use anyhow::Context;
use clap::{Parser, Subcommand};
use sightline_eye::config::ViewerConfig;
use sightline_eye::models::{ChannelObserver, HttpModelFetcher, ModelFetcher};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "SIGHTLINE_CONFIG";

#[derive(Parser)]
#[command(name = "sightline-models")]
#[command(about = "List and download sightline detection models", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to $SIGHTLINE_CONFIG)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the configured model options
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download a model by name or path
    Fetch {
        /// Model name or path
        model: String,

        /// Output file (defaults to the model's file name)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config.models)?);
            } else {
                for model in &config.models {
                    let marker = if model.path == config.default_model { "*" } else { " " };
                    println!("{} {:<32} {}", marker, model.name, model.path);
                }
            }
        }
        Commands::Fetch { model, output } => {
            let option = config
                .find_model(&model)
                .with_context(|| format!("Unknown model {:?}; run `sightline-models list`", model))?
                .clone();

            let mut fetcher = HttpModelFetcher::new();
            if let Some(base_url) = &config.model_base_url {
                fetcher = fetcher.with_base_url(base_url)?;
            }

            let (observer, mut progress) = ChannelObserver::channel();
            let reporter = tokio::spawn(async move {
                let mut last_step = None;
                while let Some(update) = progress.recv().await {
                    match update.percent() {
                        Some(percent) => {
                            let step = (percent / 10.0) as u32;
                            if last_step != Some(step) {
                                last_step = Some(step);
                                info!("{:.0}% ({} bytes)", percent, update.bytes_loaded);
                            }
                        }
                        None => info!("{} bytes", update.bytes_loaded),
                    }
                }
            });

            info!("Downloading {} from {}", option.name, option.path);
            let bytes = fetcher.fetch(&option.path, &observer).await?;
            drop(observer);
            let _ = reporter.await;

            let output = output.unwrap_or_else(|| default_output(&option.path));
            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Saved {} bytes to {}", bytes.len(), output.display());
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ViewerConfig> {
    let path = path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    match path {
        Some(path) => {
            info!("Loading config from {}", path.display());
            Ok(ViewerConfig::load(&path)?)
        }
        None => Ok(ViewerConfig::default()),
    }
}

fn default_output(model_path: &str) -> PathBuf {
    let name = model_path.rsplit('/').next().filter(|n| !n.is_empty()).unwrap_or("model.bin");
    Path::new(name).to_path_buf()
}
