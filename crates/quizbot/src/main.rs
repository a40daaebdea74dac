use anyhow::Result;
use dotenvy::dotenv;

use quizbot::cli::{Cli, Commands};
use quizbot::{app, config, logging};

/// Main entry point for the quiz bot
///
/// Parses CLI arguments and dispatches to the selected run mode.
///
/// # Errors
/// Returns an error if the logger cannot start or the selected mode fails.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    logging::install_panic_hook();

    // Load environment variables before any config static is read
    let _ = dotenv();
    if let Some(path) = cli.env_file.as_deref() {
        dotenvy::from_filename(path).map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path, e))?;
    }

    logging::init_logger(&config::LOG_FILE_PATH)?;

    match cli.command {
        Some(Commands::Serve { port }) => {
            logging::log_configuration();
            log::info!("Running in server mode");
            app::serve(port).await
        }
        Some(Commands::Run) | None => {
            logging::log_configuration();
            log::info!("Running in polling mode");
            app::run_polling().await
        }
    }
}
