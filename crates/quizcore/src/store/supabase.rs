use super::postgrest::{build_http_client, HttpLimits, PostgrestClient, Query};
use super::{tables, QuizStore};
use crate::error::AppResult;
use crate::model::{AnswerFilter, NewAnswer, Question, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

const QUESTION_COLUMNS: &str = "id,question,option_a,option_b,option_c,option_d,correct_answer,explanation,added_at";

#[derive(Deserialize)]
struct IdRow {
    id: i64,
}

#[derive(Deserialize)]
struct QuestionIdRow {
    question_id: i64,
}

/// `QuizStore` backed by a hosted Supabase (PostgREST) project.
#[derive(Clone)]
pub struct SupabaseStore {
    client: PostgrestClient,
}

impl SupabaseStore {
    pub fn new(client: PostgrestClient) -> Self {
        Self { client }
    }

    /// Connect with default HTTP limits.
    pub fn connect(project_url: &str, api_key: &str) -> AppResult<Self> {
        let http = build_http_client(HttpLimits::default())?;
        Ok(Self::new(PostgrestClient::new(project_url, api_key, http)?))
    }

    pub fn client(&self) -> &PostgrestClient {
        &self.client
    }
}

#[async_trait]
impl QuizStore for SupabaseStore {
    async fn count_questions(&self) -> AppResult<u64> {
        self.client.count(&Query::table(tables::QUESTIONS).select("id")).await
    }

    async fn answered_question_ids(&self, user_id: i64) -> AppResult<Vec<i64>> {
        let query = Query::table(tables::ANSWERS).select("question_id").eq("user_id", user_id);
        let rows: Vec<QuestionIdRow> = self.client.select(&query).await?;

        let mut ids: Vec<i64> = rows.into_iter().map(|r| r.question_id).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn unanswered_questions(&self, exclude: &[i64], limit: usize) -> AppResult<Vec<Question>> {
        let query = Query::table(tables::QUESTIONS)
            .select(QUESTION_COLUMNS)
            .not_in("id", exclude)
            .limit(limit);
        self.client.select(&query).await
    }

    async fn count_answers(&self, user_id: i64, filter: AnswerFilter) -> AppResult<u64> {
        let mut query = Query::table(tables::ANSWERS).select("id").eq("user_id", user_id);
        if filter == AnswerFilter::Correct {
            query = query.is("is_correct", "true");
        }
        self.client.count(&query).await
    }

    async fn insert_answer(&self, answer: &NewAnswer) -> AppResult<()> {
        self.client.insert(tables::ANSWERS, answer).await
    }

    async fn mark_reported(&self, user_id: i64, question_id: i64, reason: &str) -> AppResult<bool> {
        let latest = Query::table(tables::ANSWERS)
            .select("id")
            .eq("user_id", user_id)
            .eq("question_id", question_id)
            .order_desc("answered_at")
            .limit(1);
        let rows: Vec<IdRow> = self.client.select(&latest).await?;
        let Some(row) = rows.first() else {
            return Ok(false);
        };

        let target = Query::table(tables::ANSWERS).eq("id", row.id);
        let patch = json!({ "reported": true, "report_reason": reason });
        let changed = self.client.update(&target, &patch).await?;
        Ok(changed > 0)
    }

    async fn get_user(&self, user_id: i64) -> AppResult<Option<UserProfile>> {
        let query = Query::table(tables::USERS).eq("telegram_id", user_id).limit(1);
        let rows: Vec<UserProfile> = self.client.select(&query).await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_user(&self, user: &UserProfile) -> AppResult<()> {
        self.client.upsert(tables::USERS, user, "telegram_id").await
    }

    async fn touch_user(&self, user_id: i64, at: DateTime<Utc>) -> AppResult<()> {
        let query = Query::table(tables::USERS).eq("telegram_id", user_id);
        self.client.update(&query, &json!({ "last_interaction": at })).await?;
        Ok(())
    }
}
