//! Configuration read from the environment
//!
//! Every value is read once, on first access. `.env` is loaded by `main`
//! before anything here is touched.

use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Bot token
/// Read from TELEGRAM_TOKEN, falling back to BOT_TOKEN and TELOXIDE_TOKEN
pub static TELEGRAM_TOKEN: Lazy<Option<String>> =
    Lazy::new(|| first_non_empty(&["TELEGRAM_TOKEN", "BOT_TOKEN", "TELOXIDE_TOKEN"]));

/// Project URL of the hosted database, e.g. https://xyz.supabase.co
pub static SUPABASE_URL: Lazy<Option<String>> = Lazy::new(|| first_non_empty(&["SUPABASE_URL"]));

/// Service or anon key for the hosted database
pub static SUPABASE_KEY: Lazy<Option<String>> = Lazy::new(|| first_non_empty(&["SUPABASE_KEY"]));

/// Channel users must join once the free questions are used up
/// Either `@username` or a numeric chat id
pub static CHANNEL_ID: Lazy<Option<String>> = Lazy::new(|| first_non_empty(&["CHANNEL_ID"]));

/// Invite link shown on the join button
/// Default: derived from CHANNEL_ID when it is an @username
pub static CHANNEL_INVITE_LINK: Lazy<Option<String>> = Lazy::new(|| {
    first_non_empty(&["CHANNEL_INVITE_LINK"]).or_else(|| {
        CHANNEL_ID
            .as_deref()
            .and_then(|id| id.strip_prefix('@'))
            .map(|name| format!("https://t.me/{name}"))
    })
});

/// Whether the subscription gate is active
/// Default: on when CHANNEL_ID is set
pub static REQUIRE_SUBSCRIPTION: Lazy<bool> =
    Lazy::new(|| env_flag("REQUIRE_SUBSCRIPTION").unwrap_or(CHANNEL_ID.is_some()) && CHANNEL_ID.is_some());

/// Questions a user may answer before the gate applies
/// Default: 10
pub static FREE_QUESTIONS_LIMIT: Lazy<u64> = Lazy::new(|| env_parse("FREE_QUESTIONS_LIMIT", 10));

/// How long a membership answer is trusted, in seconds
/// Default: 60
pub static SUBSCRIPTION_CACHE_TTL_SECS: Lazy<u64> = Lazy::new(|| env_parse("SUBSCRIPTION_CACHE_TTL_SECS", 60));

/// Sessions untouched for this long are dropped, in seconds
/// Default: 86400
pub static SESSION_IDLE_SECS: Lazy<u64> = Lazy::new(|| env_parse("SESSION_IDLE_SECS", 86_400));

/// Candidates fetched per question pick
/// Default: 50
pub static QUESTION_PAGE_SIZE: Lazy<usize> = Lazy::new(|| env_parse("QUESTION_PAGE_SIZE", 50));

/// HTTP port for `serve` mode
/// Default: 8080
pub static PORT: Lazy<u16> = Lazy::new(|| env_parse("PORT", 8080));

/// Public URL Telegram should deliver updates to (`serve` mode)
pub static WEBHOOK_URL: Lazy<Option<String>> = Lazy::new(|| first_non_empty(&["WEBHOOK_URL"]));

/// Shared secret expected in X-Telegram-Bot-Api-Secret-Token
pub static WEBHOOK_SECRET: Lazy<Option<String>> = Lazy::new(|| first_non_empty(&["WEBHOOK_SECRET"]));

/// Custom Bot API server URL
pub static BOT_API_URL: Lazy<Option<String>> = Lazy::new(|| first_non_empty(&["BOT_API_URL"]));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: app.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "app.log".to_string()));

/// Dispatch bridge configuration
pub mod dispatch {
    use super::{env_parse, Duration, Lazy};

    /// Pending jobs accepted before submissions are refused
    /// Default: 256
    pub static QUEUE_CAPACITY: Lazy<usize> = Lazy::new(|| env_parse("DISPATCH_QUEUE_CAPACITY", 256));

    /// Upper bound for one startup initialization
    /// Default: 30 seconds
    pub static INIT_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| env_parse("INIT_TIMEOUT_SECS", 30));

    pub fn init_timeout() -> Duration {
        Duration::from_secs(*INIT_TIMEOUT_SECS)
    }

    /// Seconds a webhook caller is told to wait when the bridge is busy
    pub const RETRY_AFTER_SECS: u64 = 1;
}

/// Telegram HTTP client configuration
pub mod network {
    use super::Duration;

    pub const CONNECT_TIMEOUT_SECS: u64 = 10;

    /// Long-polling requests hold the connection for up to POLL_TIMEOUT_SECS
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    pub const MAX_IDLE_PER_HOST: usize = 8;

    /// getUpdates long-poll window
    pub const POLL_TIMEOUT_SECS: u64 = 20;

    pub fn connect_timeout() -> Duration {
        Duration::from_secs(CONNECT_TIMEOUT_SECS)
    }

    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Environment variables listed by the `/env` diagnostics endpoint.
/// The flag marks values that must never be echoed back.
pub const DIAGNOSTIC_VARS: &[(&str, bool)] = &[
    ("TELEGRAM_TOKEN", true),
    ("BOT_TOKEN", true),
    ("TELOXIDE_TOKEN", true),
    ("SUPABASE_URL", false),
    ("SUPABASE_KEY", true),
    ("CHANNEL_ID", false),
    ("CHANNEL_INVITE_LINK", false),
    ("REQUIRE_SUBSCRIPTION", false),
    ("FREE_QUESTIONS_LIMIT", false),
    ("WEBHOOK_URL", false),
    ("WEBHOOK_SECRET", true),
    ("BOT_API_URL", false),
    ("PORT", false),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Credentials the bot cannot start without.
#[derive(Clone)]
pub struct Credentials {
    pub telegram_token: String,
    pub supabase_url: String,
    pub supabase_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("telegram_token", &mask(&self.telegram_token))
            .field("supabase_url", &self.supabase_url)
            .field("supabase_key", &mask(&self.supabase_key))
            .finish()
    }
}

impl Credentials {
    /// Validate the raw values.
    pub fn new(
        telegram_token: Option<String>,
        supabase_url: Option<String>,
        supabase_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        let telegram_token = telegram_token.ok_or(ConfigError::Missing("TELEGRAM_TOKEN"))?;
        let supabase_url = supabase_url.ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        let supabase_key = supabase_key.ok_or(ConfigError::Missing("SUPABASE_KEY"))?;

        if !telegram_token.contains(':') {
            return Err(ConfigError::Invalid {
                name: "TELEGRAM_TOKEN",
                reason: "expected <bot id>:<secret>".to_string(),
            });
        }
        let parsed = url::Url::parse(&supabase_url).map_err(|e| ConfigError::Invalid {
            name: "SUPABASE_URL",
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: "SUPABASE_URL",
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        Ok(Self {
            telegram_token,
            supabase_url,
            supabase_key,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(TELEGRAM_TOKEN.clone(), SUPABASE_URL.clone(), SUPABASE_KEY.clone())
    }
}

/// Keep the first four characters of a secret.
pub fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}

fn first_non_empty(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            log::warn!("Ignoring {}={}: expected a boolean", name, other);
            None
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring {}={}: not a valid value", name, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    #[test]
    fn test_credentials_report_first_missing_value() {
        assert_eq!(
            Credentials::new(None, Some("https://x.supabase.co".into()), Some("k".into())).err(),
            Some(ConfigError::Missing("TELEGRAM_TOKEN"))
        );
        assert_eq!(
            Credentials::new(Some("1:abc".into()), None, Some("k".into())).err(),
            Some(ConfigError::Missing("SUPABASE_URL"))
        );
    }

    #[test]
    fn test_credentials_validate_format() {
        assert!(matches!(
            Credentials::new(Some("nocolon".into()), Some("https://x.supabase.co".into()), Some("k".into())),
            Err(ConfigError::Invalid { name: "TELEGRAM_TOKEN", .. })
        ));
        assert!(matches!(
            Credentials::new(Some("1:abc".into()), Some("ftp://x".into()), Some("k".into())),
            Err(ConfigError::Invalid { name: "SUPABASE_URL", .. })
        ));
        assert!(Credentials::new(Some("1:abc".into()), Some("https://x.supabase.co".into()), Some("k".into())).is_ok());
    }

    #[test]
    fn test_debug_masks_secrets() {
        let creds = Credentials::new(
            Some("123456:SECRET".into()),
            Some("https://x.supabase.co".into()),
            Some("service-role-key".into()),
        )
        .unwrap();
        let printed = format!("{creds:?}");
        assert!(!printed.contains("SECRET"));
        assert!(!printed.contains("service-role-key"));
        assert!(printed.contains("1234****"));
    }

    #[test]
    fn test_mask_short_values() {
        assert_eq!(mask("abc"), "****");
        assert_eq!(mask("abcdef"), "abcd****");
    }

    #[test]
    #[serial]
    fn test_env_helpers() {
        env::set_var("QUIZBOT_TEST_FLAG", "Yes");
        env::set_var("QUIZBOT_TEST_NUM", "not-a-number");
        assert_eq!(env_flag("QUIZBOT_TEST_FLAG"), Some(true));
        assert_eq!(env_parse("QUIZBOT_TEST_NUM", 7u64), 7);
        assert_eq!(env_flag("QUIZBOT_TEST_UNSET"), None);
        env::set_var("QUIZBOT_TEST_FIRST", "  ");
        env::set_var("QUIZBOT_TEST_SECOND", "value");
        assert_eq!(
            first_non_empty(&["QUIZBOT_TEST_FIRST", "QUIZBOT_TEST_SECOND"]).as_deref(),
            Some("value")
        );
        for name in ["QUIZBOT_TEST_FLAG", "QUIZBOT_TEST_NUM", "QUIZBOT_TEST_FIRST", "QUIZBOT_TEST_SECOND"] {
            env::remove_var(name);
        }
    }
}
