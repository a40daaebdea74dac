//! Domain types shared by the store, the selection policy and the flow.
//!
//! Field names follow the column names of the hosted tables (`users`,
//! `questions`, `answers`) so rows can be (de)serialized without mapping code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// One of the four answer options of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(ascii_case_insensitive)]
pub enum OptionTag {
    A,
    B,
    C,
    D,
}

impl OptionTag {
    /// Position of the option inside `[a, b, c, d]`.
    pub fn index(self) -> usize {
        match self {
            OptionTag::A => 0,
            OptionTag::B => 1,
            OptionTag::C => 2,
            OptionTag::D => 3,
        }
    }

    pub fn all() -> impl Iterator<Item = OptionTag> {
        OptionTag::iter()
    }
}

impl Serialize for OptionTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_ref())
    }
}

impl<'de> Deserialize<'de> for OptionTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        OptionTag::from_str(raw.trim()).map_err(|_| serde::de::Error::custom(format!("invalid option tag: {raw}")))
    }
}

/// Why a user flagged a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ReportReason {
    WrongAnswer,
    Typo,
    Unclear,
    Other,
}

impl ReportReason {
    /// Button label shown in the report menu
    pub fn label(self) -> &'static str {
        match self {
            ReportReason::WrongAnswer => "❗ Wrong answer / إجابة خاطئة",
            ReportReason::Typo => "✏️ Typo / خطأ إملائي",
            ReportReason::Unclear => "❓ Unclear question / سؤال غير واضح",
            ReportReason::Other => "📝 Other / سبب آخر",
        }
    }

    pub fn all() -> impl Iterator<Item = ReportReason> {
        ReportReason::iter()
    }
}

/// A multiple-choice question (read-only reference data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    #[serde(rename = "question")]
    pub prompt: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
    pub correct_answer: OptionTag,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

impl Question {
    /// Text of the given option
    pub fn option(&self, tag: OptionTag) -> &str {
        match tag {
            OptionTag::A => &self.option_a,
            OptionTag::B => &self.option_b,
            OptionTag::C => &self.option_c,
            OptionTag::D => &self.option_d,
        }
    }

    /// All four option texts in A–D order
    pub fn options(&self) -> [String; 4] {
        [
            self.option_a.clone(),
            self.option_b.clone(),
            self.option_c.clone(),
            self.option_d.clone(),
        ]
    }
}

/// Row inserted into `answers` for every answer submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAnswer {
    pub user_id: i64,
    pub question_id: i64,
    pub selected_answer: OptionTag,
    pub correct_answer: OptionTag,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// Row as stored in `answers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub id: i64,
    pub user_id: i64,
    pub question_id: i64,
    pub selected_answer: OptionTag,
    pub correct_answer: OptionTag,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
    #[serde(default)]
    pub reported: bool,
    #[serde(default)]
    pub report_reason: Option<String>,
}

/// Which answer rows to count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerFilter {
    All,
    Correct,
}

/// Profile row in `users`.
///
/// `None` fields are omitted when serialized so an upsert never clears a
/// column that was filled in earlier (e.g. the phone number).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub telegram_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_interaction: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn has_phone(&self) -> bool {
        self.phone_number.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}

/// Per-user progress numbers shown on the stats screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStats {
    pub answered: u64,
    pub correct: u64,
    pub total_questions: u64,
}

impl UserStats {
    pub fn wrong(&self) -> u64 {
        self.answered.saturating_sub(self.correct)
    }

    /// Percentage of correct answers, 0 when nothing was answered yet
    pub fn accuracy(&self) -> f64 {
        if self.answered == 0 {
            0.0
        } else {
            self.correct as f64 * 100.0 / self.answered as f64
        }
    }

    pub fn remaining(&self) -> u64 {
        self.total_questions.saturating_sub(self.answered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_option_tag_parse() {
        assert_eq!(OptionTag::from_str("A").ok(), Some(OptionTag::A));
        assert_eq!(OptionTag::from_str("d").ok(), Some(OptionTag::D));
        assert!(OptionTag::from_str("E").is_err());
        assert_eq!(OptionTag::C.to_string(), "C");
        assert_eq!(OptionTag::all().count(), 4);
    }

    #[test]
    fn test_question_deserializes_from_row() {
        let row = serde_json::json!({
            "id": 7,
            "question": "Normal adult heart rate?",
            "option_a": "20-40",
            "option_b": "60-100",
            "option_c": "120-160",
            "option_d": "180-200",
            "correct_answer": " b ",
            "explanation": "Resting rate for adults"
        });
        let q: Question = serde_json::from_value(row).unwrap();
        assert_eq!(q.correct_answer, OptionTag::B);
        assert_eq!(q.option(OptionTag::B), "60-100");
        assert_eq!(q.added_at, None);
    }

    #[test]
    fn test_user_profile_skips_empty_columns() {
        let profile = UserProfile {
            telegram_id: 42,
            phone_number: Some("+10000000000".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value, serde_json::json!({"telegram_id": 42, "phone_number": "+10000000000"}));
        assert!(profile.has_phone());
    }

    #[test]
    fn test_report_reason_roundtrip_names() {
        assert_eq!(ReportReason::WrongAnswer.to_string(), "wrong_answer");
        assert_eq!(ReportReason::from_str("typo").ok(), Some(ReportReason::Typo));
    }

    #[test]
    fn test_user_stats_accuracy() {
        let stats = UserStats {
            answered: 8,
            correct: 6,
            total_questions: 20,
        };
        assert_eq!(stats.wrong(), 2);
        assert_eq!(stats.remaining(), 12);
        assert!((stats.accuracy() - 75.0).abs() < f64::EPSILON);
        assert_eq!(UserStats::default().accuracy(), 0.0);
    }
}
