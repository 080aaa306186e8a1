use clap::Parser;
use tracing_subscriber::EnvFilter;

use concierge_bot::config::Config;
use concierge_bot::{config_store, daemon};
use concierge_bot::error::Result;

#[derive(Parser, Debug)]
#[command(name = "concierge-botd")]
#[command(about = "Concierge bot webhook daemon")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8443)]
    port: u16,

    #[arg(long, default_value = "./data/concierge-bot.db")]
    db: String,

    /// JSON config file; when absent, config is read from the database.
    #[arg(long)]
    config: Option<String>,

    #[arg(long, env = "CONCIERGE_BOT_CHANNEL_ACCESS_TOKEN", default_value = "")]
    channel_access_token: String,

    #[arg(long, env = "CONCIERGE_BOT_CHANNEL_SECRET", default_value = "")]
    channel_secret: String,

    #[arg(long, env = "CONCIERGE_BOT_GEMINI_API_KEY", default_value = "")]
    gemini_api_key: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,concierge_bot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_store(&cli.db)?,
    };
    if config.sqlite_path.is_none() {
        config.sqlite_path = Some(cli.db.clone());
    }

    let mut line = config.line.take().unwrap_or_default();
    if !cli.channel_access_token.is_empty() {
        line.channel_access_token = Some(cli.channel_access_token.clone());
    }
    if !cli.channel_secret.is_empty() {
        line.channel_secret = Some(cli.channel_secret.clone());
    }
    config.line = Some(line);

    if !cli.gemini_api_key.is_empty() {
        let mut gemini = config.gemini.take().unwrap_or_default();
        gemini.api_key = Some(cli.gemini_api_key.clone());
        config.gemini = Some(gemini);
    }

    // The stored row tracks the effective config, so later runs can boot
    // without flags or env vars.
    config_store::save_config(&config.sqlite_path(), &config)?;

    daemon::run(&cli.host, cli.port, config).await
}
