use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sluice_pipeline::{Compiler, FsContentProvider, StageDef};
use sluice_runtime::{Pipeline, RuntimeConfig, validate};

/// Sluice - a Logstash-compatible event pipeline
#[derive(Parser)]
#[command(name = "sluice")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.sluice)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a pipeline until interrupted
  Run {
    /// Path to the pipeline configuration
    config_file: PathBuf,

    /// Pipeline name, used as the prefix of stage names
    #[arg(long, default_value = "main")]
    name: String,
  },

  /// Compile a configuration and print its stages as JSON
  Check {
    /// Path to the pipeline configuration
    config_file: PathBuf,

    #[arg(long, default_value = "main")]
    name: String,
  },

  /// Print the documentation of every available stage as JSON
  Plugins,
}

fn main() -> Result<()> {
  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();

  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Run { config_file, name }) => {
      let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::home_dir()
          .context("could not determine home directory")?
          .join(".sluice"),
      };
      run_pipeline(config_file, name, data_dir)?;
    }
    Some(Commands::Check { config_file, name }) => {
      check_pipeline(&config_file, &name)?;
    }
    Some(Commands::Plugins) => {
      let registry = sluice_stages::builtin_registry();
      println!("{}", serde_json::to_string_pretty(&registry.docs())?);
    }
    None => {
      println!("sluice - use --help to see available commands");
    }
  }

  Ok(())
}

fn compile_file(config_file: &Path, name: &str) -> Result<Vec<StageDef>> {
  let text = std::fs::read_to_string(config_file)
    .with_context(|| format!("failed to read configuration: {}", config_file.display()))?;

  let path = config_file
    .canonicalize()
    .unwrap_or_else(|_| config_file.to_path_buf());
  let working_dir = path.parent().unwrap_or(Path::new("."));

  Compiler::new(name, &FsContentProvider)
    .compile_text(&path.display().to_string(), &text, working_dir)
    .with_context(|| format!("failed to compile configuration: {}", config_file.display()))
}

fn check_pipeline(config_file: &Path, name: &str) -> Result<()> {
  let defs = compile_file(config_file, name)?;
  let registry = sluice_stages::builtin_registry();
  let sorted = validate(&defs, &registry).context("invalid pipeline")?;

  eprintln!("Configuration OK: {} stages", sorted.len());
  println!("{}", serde_json::to_string_pretty(&sorted)?);
  Ok(())
}

fn run_pipeline(config_file: PathBuf, name: String, data_dir: PathBuf) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_pipeline_async(config_file, name, data_dir).await })
}

async fn run_pipeline_async(config_file: PathBuf, name: String, data_dir: PathBuf) -> Result<()> {
  let defs = compile_file(&config_file, &name)?;

  tokio::fs::create_dir_all(&data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let registry = sluice_stages::builtin_registry();
  let config = RuntimeConfig::new(&data_dir);
  let mut pipeline = Pipeline::build(defs, &registry, &config)
    .await
    .context("failed to build pipeline")?;

  pipeline
    .start()
    .await
    .context("failed to start pipeline")?;

  eprintln!(
    "Pipeline '{}' running ({} stages, run {}). Press Ctrl-C to stop.",
    pipeline.name(),
    pipeline.stages().count(),
    pipeline.run_id()
  );

  tokio::signal::ctrl_c()
    .await
    .context("failed to listen for Ctrl-C")?;

  eprintln!("Stopping pipeline '{}'", pipeline.name());
  pipeline.stop().await;
  Ok(())
}
