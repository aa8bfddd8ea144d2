//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use deckchat_core::config::{self, SERVER_URL_ENV};
use deckchat_core::logging;

mod commands;
mod render;

#[derive(Parser)]
#[command(name = "deckchat")]
#[command(version)]
#[command(about = "Chat with your analytics server and build slide decks from its charts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Analytics server base URL (overrides config)
    #[arg(long, global = true, env = SERVER_URL_ENV, value_name = "URL")]
    server: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Interactive chat session (default)
    Chat,

    /// Send one message and print the reply
    Send {
        /// The message to send
        #[arg(value_name = "MESSAGE")]
        message: String,

        /// Continue an existing conversation
        #[arg(long, value_name = "ID")]
        conversation: Option<String>,

        /// Use the non-streaming endpoint
        #[arg(long = "no-stream")]
        no_stream: bool,

        /// Write the resulting deck (if any) as JSON
        #[arg(long, value_name = "PATH")]
        save_deck: Option<PathBuf>,
    },

    /// Rasterize charts and export a deck saved as JSON
    Export {
        /// Deck JSON file
        #[arg(value_name = "DECK_JSON")]
        deck: PathBuf,

        /// Output file or directory (default: export_dir from config)
        #[arg(short, long, value_name = "PATH")]
        out: Option<PathBuf>,

        /// Print the server's slide preview instead of exporting
        #[arg(long)]
        preview: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Chat => "chat",
            Commands::Send { .. } => "send",
            Commands::Export { .. } => "export",
            Commands::Config { .. } => "config",
        }
    }
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

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Config commands must work with a broken config file.
    if let Some(Commands::Config { command }) = &cli.command {
        return match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Generate => commands::config::generate(),
        };
    }

    let mut config = config::Config::load().context("load config")?;
    config.server_override = cli.server.clone();

    let _log_guard = logging::init(&config::paths::logs_dir(), &config.log_level)
        .context("initialize logging")?;

    // single-threaded: stream events are handled one at a time
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli.command, &config).await })
}

async fn dispatch(command: Option<Commands>, config: &config::Config) -> Result<()> {
    let server = config.server_url()?;
    let name = command.as_ref().map_or("chat", Commands::name);
    tracing::info!(command = name, %server, "dispatching command");

    // default to chat mode
    let Some(command) = command else {
        return commands::chat::run(config).await;
    };

    match command {
        Commands::Chat => commands::chat::run(config).await,
        Commands::Send {
            message,
            conversation,
            no_stream,
            save_deck,
        } => {
            commands::send::run(commands::send::SendOptions {
                message: &message,
                conversation: conversation.as_deref(),
                no_stream,
                save_deck: save_deck.as_deref(),
                config,
            })
            .await
        }
        Commands::Export { deck, out, preview } => {
            commands::export::run(&deck, out.as_deref(), preview, config).await
        }
        Commands::Config { .. } => Ok(()),
    }
}
