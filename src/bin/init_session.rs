//! Session initialization binary.

use tg_collector::commands::login;
use tg_collector::{logging, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    logging::init()?;
    let config = Config::load(None)?;
    login::run(&config).await?;
    Ok(())
}
