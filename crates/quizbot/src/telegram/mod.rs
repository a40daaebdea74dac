//! Telegram integration: bot setup, membership lookups, update routing and rendering

pub mod bot;
pub mod membership;
pub mod render;
pub mod router;

// Re-exports for convenience
pub use bot::{create_bot, register_webhook, setup_bot_commands};
pub use membership::TelegramMembership;
pub use router::QuizRouter;
