mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use emotia_core::{default_config_path, Config};

#[derive(Parser)]
#[command(name = "emotia")]
#[command(about = "Emotion-aware chat client and classification gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a piece of text and print the score table
    Classify {
        /// Text to classify (joined with spaces)
        #[arg(required = true)]
        text: Vec<String>,
        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve JSON-line classification requests on stdin/stdout
    Worker,
    /// Join the real-time chat channel
    Chat {
        /// Channel base URL (defaults to the configured server)
        #[arg(short, long)]
        server: Option<String>,
        /// User id to connect as (defaults to a random one)
        #[arg(short, long)]
        user: Option<String>,
        /// Classify outgoing messages locally and attach the result
        #[arg(long)]
        annotate: bool,
    },
    /// Response cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Remove every cached classification
    Clear,
    /// Remove cached classifications past their TTL
    Sweep,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file location
    Path,
    /// Store the inference API key in the configuration file
    SetKey {
        /// API key
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries command output (and worker responses), so logs go to stderr
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .format_timestamp_secs()
        .init();

    let config_path = default_config_path()?;
    let config = Config::load(&config_path)?;

    match cli.command {
        Commands::Classify { text, json } => {
            commands::classify::classify_command(&config, &text.join(" "), json).await
        }
        Commands::Worker => commands::worker::worker_command(&config).await,
        Commands::Chat {
            server,
            user,
            annotate,
        } => commands::chat::chat_command(config, server, user, annotate).await,
        Commands::Cache { action } => match action {
            CacheAction::Clear => commands::cache::handle_cache_clear(&config),
            CacheAction::Sweep => commands::cache::handle_cache_sweep(&config),
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::handle_config_show(&config),
            ConfigAction::Path => {
                println!("{}", config_path.display());
                Ok(())
            }
            ConfigAction::SetKey { key } => commands::config::handle_config_set_key(&config_path, &key),
        },
    }
}
