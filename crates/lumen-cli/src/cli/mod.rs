//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lumen_core::config;
use lumen_core::effects::Area;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "lumen")]
#[command(version)]
#[command(about = "Render streamed model output into rich HTML")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Render a complete response to HTML
    Render {
        /// File to render (default: stdin)
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,

        /// Wrap the fragment into a standalone HTML page
        #[arg(long)]
        document: bool,

        /// Page title used with --document
        #[arg(long, default_value = "Lumen")]
        title: String,

        /// Copy the literal text of code block N to the clipboard
        #[arg(long, value_name = "N")]
        copy: Option<usize>,

        /// Open code block N in the browser (markup blocks only)
        #[arg(long, value_name = "N")]
        preview: Option<usize>,
    },

    /// Replay a JSON-lines log of bridge events and print the result
    Replay {
        /// Event log (default: stdin)
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,

        /// Area to print (default: the active view)
        #[arg(long, value_enum)]
        area: Option<AreaArg>,

        /// Print the UI effects of each event as JSON lines instead of HTML
        #[arg(long)]
        effects: bool,

        /// Wrap the output into a standalone HTML page
        #[arg(long, conflicts_with = "effects")]
        document: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Generate a fresh config from Rust defaults (for xtask)
    Generate,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum AreaArg {
    Chat,
    Results,
}

impl From<AreaArg> for Area {
    fn from(arg: AreaArg) -> Self {
        match arg {
            AreaArg::Chat => Area::Chat,
            AreaArg::Results => Area::Results,
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommands::Path => commands::config::path(),
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Generate => commands::config::generate(),
        },

        Commands::Render {
            input,
            document,
            title,
            copy,
            preview,
        } => {
            let config = config::Config::load().context("load config")?;
            commands::render::run(
                &commands::render::RenderOptions {
                    input: input.as_deref(),
                    document,
                    title: &title,
                    copy,
                    preview,
                },
                &config,
            )
        }

        Commands::Replay {
            input,
            area,
            effects,
            document,
        } => {
            let config = config::Config::load().context("load config")?;
            commands::replay::run(
                &commands::replay::ReplayOptions {
                    input: input.as_deref(),
                    area: area.map(Into::into),
                    effects,
                    document,
                },
                &config,
            )
        }
    }
}

/// Logs go to stderr so stdout carries only rendered output.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LUMEN_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
