//! Collection bot binary.

use tg_collector::{bot, logging, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = Config::load(None)?;
    logging::init_with_file(
        &config.bot.log_file,
        config.bot.max_log_size,
        &config.collector.timezone,
    )?;
    bot::run(config).await?;
    Ok(())
}
