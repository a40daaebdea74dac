//! Bot instance creation and one-time Bot API setup

use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::types::BotCommand;

use crate::config;

/// Creates a Bot instance with custom or default API URL
///
/// # Arguments
/// * `token` - Bot token from @BotFather
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Invalid BOT_API_URL or HTTP client setup failure
pub fn create_bot(token: &str) -> anyhow::Result<Bot> {
    let client = ClientBuilder::new()
        .connect_timeout(config::network::connect_timeout())
        .timeout(config::network::timeout())
        .pool_max_idle_per_host(config::network::MAX_IDLE_PER_HOST)
        .build()?;

    let bot = Bot::with_client(token, client);
    let bot = match config::BOT_API_URL.as_deref() {
        Some(bot_api_url) => {
            log::info!("Using custom Bot API URL: {}", bot_api_url);
            let url = url::Url::parse(bot_api_url).map_err(|e| anyhow::anyhow!("Invalid BOT_API_URL: {}", e))?;
            bot.set_api_url(url)
        }
        None => bot,
    };

    Ok(bot)
}

/// Sets up bot commands in Telegram UI
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(vec![BotCommand::new("start", "Start the quiz / بدء الاختبار")])
        .await?;
    Ok(())
}

/// Points Telegram at `webhook_url`, attaching the shared secret if one is configured.
pub async fn register_webhook(
    bot: &Bot,
    webhook_url: &str,
    secret: Option<&str>,
) -> anyhow::Result<()> {
    let url = url::Url::parse(webhook_url).map_err(|e| anyhow::anyhow!("Invalid WEBHOOK_URL: {}", e))?;

    let request = bot.set_webhook(url);
    match secret {
        Some(secret) => request.secret_token(secret.to_string()).await?,
        None => request.await?,
    };
    log::info!("Webhook registered at {}", webhook_url);
    Ok(())
}
