//! quizcore - question store, sessions and quiz flow for the quiz bot
//!
//! Nothing in this crate talks to Telegram directly. The bot crate feeds
//! `flow::Inbound` events in and renders the returned `reply::Reply` values.
//!
//! # Module Structure
//!
//! - `model`: rows of the hosted tables and small value types
//! - `store`: `QuizStore` trait, PostgREST and in-memory backends
//! - `session`: in-memory per-user quiz state
//! - `selection`: picks the next unanswered question
//! - `gate`: channel-subscription check with a TTL cache
//! - `callback`: inline-button callback data grammar
//! - `flow`: the conversation state machine

pub mod callback;
pub mod error;
pub mod flow;
pub mod gate;
pub mod model;
pub mod reply;
pub mod selection;
pub mod session;
pub mod store;
pub mod texts;

// Re-export commonly used types for convenience
pub use callback::CallbackAction;
pub use error::{AppError, AppResult};
pub use flow::{FlowSettings, Inbound, QuizFlow, Sender};
pub use gate::{MembershipProbe, MembershipStatus, SubscriptionGate};
pub use model::{OptionTag, Question, ReportReason, UserProfile};
pub use reply::{Button, ButtonTarget, Delivery, Keyboard, Reply};
pub use selection::{QuestionPicker, Selection};
pub use session::SessionStore;
pub use store::{MemoryStore, QuizStore, SupabaseStore};
