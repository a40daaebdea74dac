//! Logging initialization and startup diagnostics

use anyhow::Result;
use simplelog::*;
use std::fs::File;

use crate::config;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Install a panic hook that routes panics through the logger.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
        if let Some(msg) = panic_info.payload().downcast_ref::<&str>() {
            log::error!("Panic message: {}", msg);
        }
    }));
}

/// Logs the effective configuration at startup, secrets masked.
pub fn log_configuration() {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("⚙️  Configuration");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    match config::TELEGRAM_TOKEN.as_deref() {
        Some(token) => log::info!("✅ TELEGRAM_TOKEN: {}", config::mask(token)),
        None => log::error!("❌ TELEGRAM_TOKEN: not set"),
    }
    match config::SUPABASE_URL.as_deref() {
        Some(url) => log::info!("✅ SUPABASE_URL: {}", url),
        None => log::error!("❌ SUPABASE_URL: not set"),
    }
    match config::SUPABASE_KEY.as_deref() {
        Some(key) => log::info!("✅ SUPABASE_KEY: {}", config::mask(key)),
        None => log::error!("❌ SUPABASE_KEY: not set"),
    }

    if *config::REQUIRE_SUBSCRIPTION {
        log::info!(
            "🔒 Subscription gate: on (channel {:?}, {} free questions, cache {}s)",
            config::CHANNEL_ID.as_deref(),
            *config::FREE_QUESTIONS_LIMIT,
            *config::SUBSCRIPTION_CACHE_TTL_SECS
        );
        if config::CHANNEL_INVITE_LINK.is_none() {
            log::warn!("⚠️  CHANNEL_INVITE_LINK not set, the join button will be hidden");
        }
    } else {
        log::info!("🔓 Subscription gate: off");
    }
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::NamedTempFile;

    #[test]
    fn test_init_logger_creates_log_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        // A second global logger cannot be installed, so either outcome is fine.
        let _ = init_logger(path);
        assert!(temp_file.path().exists());
    }

    #[test]
    fn test_init_logger_rejects_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing").join("app.log");
        assert!(init_logger(missing.to_str().unwrap()).is_err());
    }
}
