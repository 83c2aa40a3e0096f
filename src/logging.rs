//! tracing subscriber setup shared by the binaries

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::calendar::{now_local, Zone};
use crate::writer::trim_log_file;

pub const DEFAULT_DIRECTIVE: &str = "tg_collector=info";

fn env_filter() -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::from_default_env().add_directive(DEFAULT_DIRECTIVE.parse()?))
}

/// Console logging only.
pub fn init() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter()?)
        .with(fmt::layer())
        .try_init()?;
    Ok(())
}

/// Console logging mirrored into `log_file`.
///
/// The file is reset first when it is larger than `max_size` bytes.
pub fn init_with_file(log_file: &Path, max_size: u64, tz: &Zone) -> anyhow::Result<()> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    trim_log_file(log_file, max_size, now_local(tz))?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    tracing_subscriber::registry()
        .with(env_filter()?)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()?;
    Ok(())
}
