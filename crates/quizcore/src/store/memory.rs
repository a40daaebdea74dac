use super::QuizStore;
use crate::error::{AppError, AppResult};
use crate::model::{AnswerFilter, AnswerRecord, NewAnswer, Question, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    questions: Vec<Question>,
    answers: Vec<AnswerRecord>,
    users: HashMap<i64, UserProfile>,
    next_answer_id: i64,
}

/// In-process `QuizStore` with the same semantics as the hosted tables.
///
/// `set_unavailable(true)` makes every call fail, which is how tests exercise
/// the degraded paths.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_questions(questions: Vec<Question>) -> Self {
        let store = Self::new();
        store.tables().questions = questions;
        store
    }

    pub fn add_question(&self, question: Question) {
        self.tables().questions.push(question);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of all answer rows, in insertion order.
    pub fn answers(&self) -> Vec<AnswerRecord> {
        self.tables().answers.clone()
    }

    pub fn user(&self, user_id: i64) -> Option<UserProfile> {
        self.tables().users.get(&user_id).cloned()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn available(&self) -> AppResult<MutexGuard<'_, Tables>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Store("store unavailable".to_string()));
        }
        Ok(self.tables())
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn count_questions(&self) -> AppResult<u64> {
        Ok(self.available()?.questions.len() as u64)
    }

    async fn answered_question_ids(&self, user_id: i64) -> AppResult<Vec<i64>> {
        let tables = self.available()?;
        let mut ids: Vec<i64> = tables
            .answers
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.question_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn unanswered_questions(&self, exclude: &[i64], limit: usize) -> AppResult<Vec<Question>> {
        let tables = self.available()?;
        Ok(tables
            .questions
            .iter()
            .filter(|q| !exclude.contains(&q.id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_answers(&self, user_id: i64, filter: AnswerFilter) -> AppResult<u64> {
        let tables = self.available()?;
        let count = tables
            .answers
            .iter()
            .filter(|a| a.user_id == user_id)
            .filter(|a| filter == AnswerFilter::All || a.is_correct)
            .count();
        Ok(count as u64)
    }

    async fn insert_answer(&self, answer: &NewAnswer) -> AppResult<()> {
        let mut tables = self.available()?;
        tables.next_answer_id += 1;
        let id = tables.next_answer_id;
        tables.answers.push(AnswerRecord {
            id,
            user_id: answer.user_id,
            question_id: answer.question_id,
            selected_answer: answer.selected_answer,
            correct_answer: answer.correct_answer,
            is_correct: answer.is_correct,
            answered_at: answer.answered_at,
            reported: false,
            report_reason: None,
        });
        Ok(())
    }

    async fn mark_reported(&self, user_id: i64, question_id: i64, reason: &str) -> AppResult<bool> {
        let mut tables = self.available()?;
        let latest = tables
            .answers
            .iter_mut()
            .filter(|a| a.user_id == user_id && a.question_id == question_id)
            .max_by_key(|a| (a.answered_at, a.id));

        match latest {
            Some(row) => {
                row.reported = true;
                row.report_reason = Some(reason.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_user(&self, user_id: i64) -> AppResult<Option<UserProfile>> {
        Ok(self.available()?.users.get(&user_id).cloned())
    }

    async fn upsert_user(&self, user: &UserProfile) -> AppResult<()> {
        let mut tables = self.available()?;
        let row = tables.users.entry(user.telegram_id).or_insert_with(|| UserProfile {
            telegram_id: user.telegram_id,
            ..Default::default()
        });

        macro_rules! merge {
            ($($field:ident),*) => {
                $(if user.$field.is_some() { row.$field = user.$field.clone(); })*
            };
        }
        merge!(username, first_name, last_name, phone_number, language_code, joined_at, last_interaction);
        Ok(())
    }

    async fn touch_user(&self, user_id: i64, at: DateTime<Utc>) -> AppResult<()> {
        let mut tables = self.available()?;
        if let Some(row) = tables.users.get_mut(&user_id) {
            row.last_interaction = Some(at);
        }
        Ok(())
    }
}
