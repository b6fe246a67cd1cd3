//! vcp-clone - command-line front end
//!
//! Submits clone jobs and runs them to completion in-process, and inspects
//! the job records under the root folder.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vcp_clone::collaborators::Collaborators;
use vcp_clone::config::{PipelineSettings, TomlConfig, MODULE_NAME};
use vcp_clone::models::{CloneRequest, JobId, Mode};
use vcp_clone::{JobStore, Pipeline};
use vcp_common::config::{
    default_config_path, load_toml_or_default, resolve_root_folder, write_toml_config,
    RootFolderLayout, ROOT_FOLDER_ENV,
};

/// Command-line arguments for vcp-clone
#[derive(Parser, Debug)]
#[command(name = "vcp-clone")]
#[command(about = "Voice-clone job runner with QC gating")]
#[command(version)]
struct Args {
    /// Root folder for job records, cache and scratch files
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// TOML config file (default: <config dir>/vcp/vcp-clone.toml)
    #[arg(short, long, env = "VCP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a clone job and run it to completion
    Submit {
        #[arg(long)]
        voice_id: String,

        /// Script to synthesize
        #[arg(long, conflicts_with = "text_file", required_unless_present = "text_file")]
        text: Option<String>,

        /// Read the script from a file
        #[arg(long)]
        text_file: Option<PathBuf>,

        #[arg(long, default_value = "elevenlabs")]
        provider: String,

        /// Speaker consent has been recorded
        #[arg(long)]
        consent: bool,

        #[arg(long, value_enum, default_value_t = CliMode::Narration)]
        mode: CliMode,

        /// Raw reference recording (enables cleanup and the speaker gate)
        #[arg(long)]
        raw_audio: Option<PathBuf>,
    },

    /// Print a job record
    Status { id: String },

    /// List job summaries, newest first
    List,

    /// Mark jobs left running by a previous process as failed
    Recover,

    /// Create the root folder layout and write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Narration,
    Dialogue,
}

impl From<CliMode> for Mode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Narration => Mode::Narration,
            CliMode::Dialogue => Mode::Dialogue,
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| default_config_path(MODULE_NAME));
    let toml_config: TomlConfig = match &config_path {
        Some(path) => load_toml_or_default(path).context("Failed to load configuration")?,
        None => TomlConfig::default(),
    };

    // Logs go to stderr; stdout carries JSON output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let root_folder = resolve_root_folder(
        args.root_folder.as_deref(),
        ROOT_FOLDER_ENV,
        toml_config.root_folder.as_deref(),
    );
    info!("Root folder: {}", root_folder.display());
    let layout = RootFolderLayout::new(root_folder);

    match args.command {
        Command::Submit {
            voice_id,
            text,
            text_file,
            provider,
            consent,
            mode,
            raw_audio,
        } => {
            let text = match (text, text_file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => bail!("either --text or --text-file is required"),
            };
            let raw_audio_path = match raw_audio {
                Some(path) => Some(
                    std::fs::canonicalize(&path)
                        .with_context(|| format!("Reference audio not found: {}", path.display()))?,
                ),
                None => None,
            };

            let settings =
                PipelineSettings::resolve(&toml_config).context("Invalid pipeline settings")?;
            let collaborators = Collaborators::from_config(&toml_config);
            let pipeline = Pipeline::new(&layout, settings, collaborators)
                .context("Failed to initialize pipeline")?;

            let request = CloneRequest {
                provider: Some(provider),
                consent_flag: consent,
                mode: mode.into(),
                raw_audio_path,
                ..CloneRequest::new(voice_id, text)
            };
            let submitted = pipeline.submit(request).await.context("Submission rejected")?;
            print_json(&submitted)?;

            let job = tokio::select! {
                job = pipeline.wait_for_terminal(submitted.id) => job?,
                _ = signal::ctrl_c() => {
                    warn!(job_id = %submitted.id, "Interrupted; cancelling job");
                    pipeline.cancel(submitted.id).await;
                    pipeline.wait_for_terminal(submitted.id).await?
                }
            };
            pipeline.shutdown().await;
            print_json(&job)?;

            if job.error.is_some() {
                std::process::exit(1);
            }
        }

        Command::Status { id } => {
            let id: JobId = id.parse()?;
            let store = JobStore::open(layout.jobs_dir())?;
            let job = store
                .get(id)
                .await?
                .ok_or_else(|| anyhow!("Job not found: {}", id))?;
            print_json(&job)?;
        }

        Command::List => {
            let store = JobStore::open(layout.jobs_dir())?;
            print_json(&store.list().await?)?;
        }

        Command::Recover => {
            let store = JobStore::open(layout.jobs_dir())?;
            let closed = store.fail_interrupted().await?;
            info!("Marked {} interrupted job(s) as failed", closed.len());
            print_json(&closed)?;
        }

        Command::Init { force } => {
            layout
                .ensure_directories_exist()
                .context("Failed to create root folder layout")?;
            info!("Root folder ready: {}", layout.root().display());

            let path = config_path.ok_or_else(|| anyhow!("No config directory; pass --config"))?;
            if path.exists() && !force {
                bail!("Config file already exists: {} (use --force)", path.display());
            }
            let config = TomlConfig {
                root_folder: Some(layout.root().to_path_buf()),
                ..toml_config
            };
            write_toml_config(&config, &path).context("Failed to write config file")?;
            info!("Wrote config file: {}", path.display());
        }
    }

    Ok(())
}
