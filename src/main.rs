use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use narration_compositor::{
    composition::{FinalizationPipeline, FinalizeRequest, MusicSelection},
    config::Config,
    script::ScriptParser,
    session::SessionStore,
    store::{InMemoryVideoRecords, LocalOutputStore},
    toolchain::FfmpegToolchain,
};

#[derive(Parser)]
#[command(
    name = "narration-compositor",
    version,
    about = "Turn narration scripts into subtitled slideshow videos",
    long_about = "Narration-Compositor splits a narration script into parts, renders a slow-zoom segment per part synchronized to its speech audio, and joins them into one subtitled video with optional background music."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Split a script into parts and print them as JSON
    Parse {
        /// Script file
        script: PathBuf,
    },

    /// Render a saved editing session into a video
    Render {
        /// Session layout JSON file
        #[arg(short, long)]
        session: PathBuf,

        /// Title used for the stored video
        #[arg(short, long, default_value = "Untitled")]
        title: String,

        /// Owner recorded with the video
        #[arg(long)]
        owner: Option<String>,

        /// Background music file
        #[arg(short, long)]
        music: Option<PathBuf>,

        /// Offset into the music file (seconds)
        #[arg(long, default_value_t = 0.0, requires = "music")]
        music_start: f64,

        /// End of the music slice (seconds)
        #[arg(long, requires = "music")]
        music_end: Option<f64>,
    },

    /// Check that ffmpeg and ffprobe can be run
    Check,

    /// Write the default configuration to a file
    InitConfig {
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays clean
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => Config::default(),
    };

    match cli.command {
        Command::Parse { script } => {
            let raw = std::fs::read_to_string(&script).with_context(|| format!("reading {:?}", script))?;
            let parser = ScriptParser::new();
            if parser.is_menu_text(&raw) {
                bail!("{:?} looks like a topic menu, not a narration script", script);
            }

            let parts = parser.parse(&raw);
            if parts.is_empty() {
                bail!("No sections found in {:?}", script);
            }
            println!("{}", serde_json::to_string_pretty(&parts)?);
        }

        Command::Render {
            session,
            title,
            owner,
            music,
            music_start,
            music_end,
        } => {
            info!("Starting Narration-Compositor v{}", env!("CARGO_PKG_VERSION"));

            let toolchain = FfmpegToolchain::from_config(&config);
            toolchain
                .check_available()
                .await
                .context("ffmpeg and ffprobe are required for rendering")?;

            let sessions = Arc::new(SessionStore::from_config(&config.session));
            let session_id = sessions
                .load_json(&session)
                .await
                .with_context(|| format!("loading session from {:?}", session))?;

            let pipeline = FinalizationPipeline::new(
                config.clone(),
                sessions,
                Arc::new(toolchain),
                Arc::new(LocalOutputStore::from_config(&config.output)?),
                Arc::new(InMemoryVideoRecords::new()),
            );

            let mut request = FinalizeRequest::new(session_id, title);
            request.owner_id = owner;
            request.music = music.map(|path| MusicSelection {
                path,
                start: music_start,
                end: music_end,
            });

            let output = pipeline.finalize(request).await.map_err(|e| anyhow::anyhow!(e.user_message()))?;
            info!("Saved to {:?}", config.output.root.join(&output.storage_key));
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Check => {
            FfmpegToolchain::from_config(&config).check_available().await?;
            println!("ffmpeg: {}", config.toolchain.ffmpeg);
            println!("ffprobe: {}", config.toolchain.ffprobe);
            println!("Toolchain OK");
        }

        Command::InitConfig { path, force } => {
            if path.exists() && !force {
                bail!("{:?} already exists (use --force to overwrite)", path);
            }
            Config::default().save_to_file(&path)?;
            println!("Wrote default configuration to {:?}", path);
        }
    }

    Ok(())
}
