//! Interactive time-window collection.
//!
//! Asks for the chat and the window, then writes the report.

use tg_collector::commands::{collect, CollectArgs};
use tg_collector::{logging, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    logging::init()?;
    let config = Config::load(None)?;
    let args = CollectArgs {
        chat: std::env::args().nth(1),
        ..CollectArgs::default()
    };
    collect::run(&config, args).await?;
    Ok(())
}
