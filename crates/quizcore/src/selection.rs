//! Question selection policy.
//!
//! Picks one question the user has not answered yet:
//! 1. fetch the ids the user already answered,
//! 2. fetch a bounded page of questions excluding those ids,
//! 3. choose uniformly at random within the page.
//!
//! When the remaining pool is larger than the page, selection is uniform over
//! the fetched page only, not over the whole pool.

use crate::model::{AnswerFilter, Question};
use crate::store::QuizStore;
use rand::Rng;
use std::sync::Arc;

/// Default number of candidates fetched per pick
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Outcome of a pick.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Picked(Question),
    /// The user has answered every question in the store
    Exhausted,
    /// Nothing to pick from (empty store, or the store failed)
    NoContent,
}

#[derive(Clone)]
pub struct QuestionPicker {
    store: Arc<dyn QuizStore>,
    page_size: usize,
}

impl QuestionPicker {
    pub fn new(store: Arc<dyn QuizStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Pick a question for `user_id`; `None` picks from the whole store.
    pub async fn pick_for(&self, user_id: Option<i64>) -> Selection {
        let answered = match user_id {
            Some(id) => match self.store.answered_question_ids(id).await {
                Ok(ids) => ids,
                Err(e) => {
                    log::error!("Failed to fetch answered questions for user {}: {}", id, e);
                    return Selection::NoContent;
                }
            },
            None => Vec::new(),
        };

        let candidates = match self.store.unanswered_questions(&answered, self.page_size).await {
            Ok(candidates) => candidates,
            Err(e) => {
                log::error!("Failed to fetch candidate questions: {}", e);
                return Selection::NoContent;
            }
        };

        if candidates.is_empty() {
            return if answered.is_empty() {
                log::warn!("No questions found in the store");
                Selection::NoContent
            } else {
                log::info!("User {:?} has answered all {} questions", user_id, answered.len());
                Selection::Exhausted
            };
        }

        let index = rand::thread_rng().gen_range(0..candidates.len());
        candidates
            .into_iter()
            .nth(index)
            .map_or(Selection::NoContent, Selection::Picked)
    }

    /// Exact number of questions, 0 if the store is unreachable.
    pub async fn total_questions(&self) -> u64 {
        self.store.count_questions().await.unwrap_or_else(|e| {
            log::error!("Failed to count questions: {}", e);
            0
        })
    }

    /// Exact number of answer rows for the user, 0 if the store is unreachable.
    pub async fn answered_count(&self, user_id: i64) -> u64 {
        self.store
            .count_answers(user_id, AnswerFilter::All)
            .await
            .unwrap_or_else(|e| {
                log::error!("Failed to count answers for user {}: {}", user_id, e);
                0
            })
    }
}
