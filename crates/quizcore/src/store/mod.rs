//! Question, user and answer storage.
//!
//! `QuizStore` is the seam between the quiz logic and the hosted data API.
//! Two backends are provided:
//! - `SupabaseStore`: PostgREST over HTTPS (production)
//! - `MemoryStore`: process-local tables (tests, local runs)

pub mod memory;
pub mod postgrest;
pub mod supabase;

use crate::error::AppResult;
use crate::model::{AnswerFilter, NewAnswer, Question, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use postgrest::{PostgrestClient, Query};
pub use supabase::SupabaseStore;

/// Table names in the hosted database
pub mod tables {
    pub const QUESTIONS: &str = "questions";
    pub const ANSWERS: &str = "answers";
    pub const USERS: &str = "users";
}

/// Storage operations needed by the quiz.
///
/// Every call is a self-contained request/response, so implementations must
/// be safe to invoke concurrently.
#[async_trait]
pub trait QuizStore: Send + Sync {
    /// Exact number of questions in the store.
    async fn count_questions(&self) -> AppResult<u64>;

    /// Ids of every question the user has at least one answer row for.
    async fn answered_question_ids(&self, user_id: i64) -> AppResult<Vec<i64>>;

    /// At most `limit` questions whose id is not in `exclude`.
    async fn unanswered_questions(&self, exclude: &[i64], limit: usize) -> AppResult<Vec<Question>>;

    /// Exact number of answer rows for the user.
    async fn count_answers(&self, user_id: i64, filter: AnswerFilter) -> AppResult<u64>;

    /// Append one answer row.
    async fn insert_answer(&self, answer: &NewAnswer) -> AppResult<()>;

    /// Flag the most recent answer row for (user, question).
    ///
    /// Returns `false` when the user never answered that question.
    async fn mark_reported(&self, user_id: i64, question_id: i64, reason: &str) -> AppResult<bool>;

    async fn get_user(&self, user_id: i64) -> AppResult<Option<UserProfile>>;

    /// Insert or merge a user row keyed by `telegram_id`.
    async fn upsert_user(&self, user: &UserProfile) -> AppResult<()>;

    /// Refresh `last_interaction` for an existing user.
    async fn touch_user(&self, user_id: i64, at: DateTime<Utc>) -> AppResult<()>;
}
