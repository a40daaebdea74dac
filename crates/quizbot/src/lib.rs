//! Telegram front end for the quiz bot.
//!
//! `quizcore` owns the quiz logic; this crate wires it to the Bot API,
//! runs every handler on the dispatch worker and exposes the HTTP surface
//! used in webhook deployments.

pub mod app;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod telegram;

pub use app::{initialize, run_polling, serve, AppState, InitOutcome, Mode};
pub use dispatch::{DispatchBridge, DispatchError};
pub use logging::init_logger;
pub use metrics::Metrics;
