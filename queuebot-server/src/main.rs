use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use queuebot_core::config::BotConfig;

mod server;

#[derive(Parser, Debug, Clone)]
#[command(name = "queuebot")]
#[command(author, version, about = "QueueBot - Twitch chat queue bot")]
struct Args {
    /// TOML config file. A missing file means "defaults + environment".
    #[arg(long, default_value = "queuebot.toml")]
    config: PathBuf,

    /// Base directory for per-channel state files.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Extra channels to join, comma separated.
    #[arg(long, env = "CHANNEL_NAMES", value_delimiter = ',')]
    channels: Vec<String>,

    /// Login name of the bot account.
    #[arg(long, env = "BOT_NAME")]
    bot_name: Option<String>,

    /// Command prefix for channels that don't set their own.
    #[arg(long)]
    prefix: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("queuebot=info".parse().unwrap_or_default());
    fmt().with_env_filter(filter).init();
}

fn load_config(args: &Args) -> anyhow::Result<BotConfig> {
    let mut config = BotConfig::load_or_default(&args.config)?;
    config.apply_env();

    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(name) = &args.bot_name {
        config.bot_name = name.clone();
    }
    if let Some(prefix) = &args.prefix {
        config.prefix = Some(prefix.clone());
    }
    config.add_channels(args.channels.iter().map(|c| c.trim()));

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!("QueueBot starting. config={}", args.config.display());

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            return Err(e);
        }
    };

    if let Err(e) = server::run(config).await {
        error!("Bot error: {:?}", e);
        return Err(e);
    }
    info!("Main finished. Goodbye!");
    Ok(())
}
