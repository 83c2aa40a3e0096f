//! tg_collector CLI - main entry point
//!
//! Collects Telegram chat messages over a time window, live, or through the
//! collection bot.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

use tg_collector::commands::{self, CollectArgs, WatchArgs};
use tg_collector::{bot, logging, metrics, Config};
use tracing::warn;

#[derive(Parser)]
#[command(name = "tg_collector")]
#[command(about = "Telegram chat message collector", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config.yml (defaults to ./config.yml, then ../config.yml)
    #[arg(short, long, env = "COLLECTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the Telegram session (interactive login)
    InitSession,

    /// Collect messages of a chat over a time window
    Collect {
        /// Chat id, invite link, t.me link, @username or config alias
        chat: Option<String>,

        /// Window start: "YYYY-MM-DD [HH:MM]" or "DD.MM.YYYY [HH:MM]"
        #[arg(long)]
        from: Option<String>,

        /// Window end (defaults to now when --from is given)
        #[arg(long)]
        to: Option<String>,

        /// Output directory for the report
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Recognise text on attached images
        #[arg(long, default_value_t = false)]
        ocr: bool,
    },

    /// Write new messages of a chat to daily/monthly files until Ctrl+C
    Watch {
        chat: Option<String>,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        #[arg(long, default_value_t = false)]
        ocr: bool,
    },

    /// Run the collection bot
    Bot,

    /// Delete expired collection files and trim the bot log
    Cleanup,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::InitSession => "init_session",
            Commands::Collect { .. } => "collect",
            Commands::Watch { .. } => "watch",
            Commands::Bot => "bot",
            Commands::Cleanup => "cleanup",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    if matches!(cli.command, Commands::Bot) {
        logging::init_with_file(
            &config.bot.log_file,
            config.bot.max_log_size,
            &config.collector.timezone,
        )?;
    } else {
        logging::init()?;
    }

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let command_name = cli.command.name();
    metrics::record_command_start(command_name);
    let start = Instant::now();

    let result = execute_command(cli.command, config).await;

    metrics::record_command_result(command_name, start.elapsed(), result.is_ok());

    result
}

async fn execute_command(command: Commands, config: Config) -> anyhow::Result<()> {
    match command {
        Commands::InitSession => commands::login::run(&config).await?,
        Commands::Collect {
            chat,
            from,
            to,
            output_dir,
            ocr,
        } => {
            let args = CollectArgs {
                chat,
                from,
                to,
                output_dir,
                ocr,
            };
            commands::collect::run(&config, args).await?;
        }
        Commands::Watch {
            chat,
            output_dir,
            ocr,
        } => {
            let args = WatchArgs {
                chat,
                output_dir,
                ocr,
            };
            commands::watch::run(&config, args).await?;
        }
        Commands::Bot => bot::run(config).await?,
        Commands::Cleanup => commands::cleanup::run(&config)?,
    }

    Ok(())
}
