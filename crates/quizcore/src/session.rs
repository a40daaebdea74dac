//! Per-user session state.
//!
//! Holds just enough to interpret the next "option X pressed" event and to
//! redraw the latest result screen after a detour into the report menu.
//! Nothing here is persisted; a restart starts every user from scratch.
//! Idle entries are dropped by [`SessionStore::cleanup`].

use crate::model::{OptionTag, Question};
use dashmap::DashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// An answer arrived but no question is active for this user
    #[error("no active question for user {0}")]
    NoActiveQuestion(i64),
}

/// The question currently shown to a user.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveQuestion {
    pub question_id: i64,
    pub correct: OptionTag,
    pub explanation: Option<String>,
    pub options: [String; 4],
}

impl ActiveQuestion {
    pub fn option(&self, tag: OptionTag) -> &str {
        &self.options[tag.index()]
    }
}

impl From<&Question> for ActiveQuestion {
    fn from(question: &Question) -> Self {
        Self {
            question_id: question.id,
            correct: question.correct_answer,
            explanation: question.explanation.clone(),
            options: question.options(),
        }
    }
}

#[derive(Debug, Clone)]
struct SessionEntry {
    question: ActiveQuestion,
    selected: Option<OptionTag>,
    touched_at: Instant,
}

/// In-memory session table keyed by user id.
#[derive(Default)]
pub struct SessionStore {
    entries: DashMap<i64, SessionEntry>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `question` the active one, replacing whatever was there.
    pub fn begin_question(&self, user_id: i64, question: &Question) {
        self.entries.insert(
            user_id,
            SessionEntry {
                question: ActiveQuestion::from(question),
                selected: None,
                touched_at: Instant::now(),
            },
        );
    }

    /// Store the user's choice for the active question.
    pub fn record_selection(&self, user_id: i64, tag: OptionTag) -> Result<ActiveQuestion, SessionError> {
        let mut entry = self
            .entries
            .get_mut(&user_id)
            .ok_or(SessionError::NoActiveQuestion(user_id))?;
        entry.selected = Some(tag);
        entry.touched_at = Instant::now();
        Ok(entry.question.clone())
    }

    pub fn current_question(&self, user_id: i64) -> Option<ActiveQuestion> {
        self.entries.get(&user_id).map(|e| e.question.clone())
    }

    pub fn last_selection(&self, user_id: i64) -> Option<OptionTag> {
        self.entries.get(&user_id).and_then(|e| e.selected)
    }

    pub fn end_session(&self, user_id: i64) {
        self.entries.remove(&user_id);
    }

    pub fn active_sessions(&self) -> usize {
        self.entries.len()
    }

    /// Drop sessions untouched for at least `max_idle`. Returns how many went.
    pub fn cleanup(&self, max_idle: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.touched_at.elapsed() < max_idle);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            log::debug!("Dropped {} idle sessions", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn question(id: i64, correct: OptionTag) -> Question {
        Question {
            id,
            prompt: format!("Question {id}"),
            option_a: "alpha".to_string(),
            option_b: "beta".to_string(),
            option_c: "gamma".to_string(),
            option_d: "delta".to_string(),
            correct_answer: correct,
            explanation: Some("because".to_string()),
            added_at: None,
        }
    }

    #[test]
    fn test_record_without_question_is_invalid_state() {
        let sessions = SessionStore::new();
        assert_eq!(
            sessions.record_selection(7, OptionTag::A),
            Err(SessionError::NoActiveQuestion(7))
        );
        assert_eq!(sessions.current_question(7), None);
        assert_eq!(sessions.last_selection(7), None);
    }

    #[test]
    fn test_begin_then_record() {
        let sessions = SessionStore::new();
        sessions.begin_question(1, &question(10, OptionTag::C));

        let active = sessions.record_selection(1, OptionTag::B).unwrap();
        assert_eq!(active.question_id, 10);
        assert_eq!(active.correct, OptionTag::C);
        assert_eq!(active.option(OptionTag::C), "gamma");
        assert_eq!(sessions.last_selection(1), Some(OptionTag::B));
    }

    #[test]
    fn test_new_question_overwrites_and_clears_selection() {
        let sessions = SessionStore::new();
        sessions.begin_question(1, &question(10, OptionTag::A));
        sessions.record_selection(1, OptionTag::A).unwrap();

        sessions.begin_question(1, &question(11, OptionTag::D));
        assert_eq!(sessions.current_question(1).map(|q| q.question_id), Some(11));
        assert_eq!(sessions.last_selection(1), None);
    }

    #[test]
    fn test_end_session_clears_everything() {
        let sessions = SessionStore::new();
        sessions.begin_question(1, &question(10, OptionTag::A));
        sessions.begin_question(2, &question(12, OptionTag::A));
        sessions.end_session(1);

        assert_eq!(sessions.current_question(1), None);
        assert_eq!(sessions.active_sessions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_drops_only_idle_sessions() {
        let sessions = SessionStore::new();
        sessions.begin_question(1, &question(10, OptionTag::A));
        sessions.begin_question(2, &question(11, OptionTag::B));

        tokio::time::advance(Duration::from_secs(50)).await;
        sessions.record_selection(2, OptionTag::B).unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(sessions.cleanup(Duration::from_secs(60)), 1);
        assert_eq!(sessions.current_question(1), None);
        assert_eq!(sessions.last_selection(2), Some(OptionTag::B));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(sessions.cleanup(Duration::from_secs(60)), 1);
        assert_eq!(sessions.active_sessions(), 0);
    }
}
