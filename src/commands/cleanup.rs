//! One-shot retention cleanup of collected files

use crate::bot::jobs::run_maintenance;
use crate::config::Config;
use crate::error::Result;

pub fn run(config: &Config) -> Result<()> {
    if config.bot.retention_days == 0 {
        println!("ℹ️ Срок хранения не задан, файлы не удаляются");
    }

    let stats = run_maintenance(config)?;
    println!(
        "🧹 Удалено файлов: {}, пустых папок: {}",
        stats.files, stats.dirs
    );
    if stats.log_trimmed {
        println!("📝 Лог-файл {} очищен", config.bot.log_file.display());
    }
    Ok(())
}
