//! Maps incoming Telegram updates onto quiz flow events and delivers the replies.

use quizcore::{CallbackAction, Inbound, QuizFlow, Sender};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ChatId, Message, UpdateKind, User};

use super::render::{self, Target};
use crate::dispatch::Job;
use crate::metrics::Metrics;

pub struct QuizRouter {
    bot: Bot,
    flow: Arc<QuizFlow>,
    metrics: Arc<Metrics>,
}

impl QuizRouter {
    pub fn new(bot: Bot, flow: Arc<QuizFlow>, metrics: Arc<Metrics>) -> Self {
        Self { bot, flow, metrics }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Package an update as a dispatch job keyed by its sender.
    pub fn job(self: &Arc<Self>, update: Update) -> (Option<i64>, Job) {
        let user_id = update_user_id(&update);
        let router = Arc::clone(self);
        (user_id, Box::pin(async move { router.handle_update(update).await }))
    }

    pub async fn handle_update(&self, update: Update) {
        match update.kind {
            UpdateKind::Message(message) => self.handle_message(message).await,
            UpdateKind::CallbackQuery(query) => self.handle_callback(query).await,
            other => log::debug!("Ignoring update {}: {:?}", update.id.0, other),
        }
    }

    async fn handle_message(&self, message: Message) {
        let Some(sender) = message.from.as_ref().and_then(sender_from) else {
            log::debug!("Ignoring message {} without a usable sender", message.id.0);
            return;
        };
        let Some(event) = inbound_from_message(&message) else {
            return;
        };

        let target = Target {
            chat_id: message.chat.id,
            message_id: None,
        };
        self.respond(&sender, event, target).await;
    }

    async fn handle_callback(&self, query: CallbackQuery) {
        // Stop the client-side spinner whatever happens next.
        if let Err(e) = self.bot.answer_callback_query(query.id.clone()).await {
            self.metrics.telegram_errors.inc();
            log::warn!("Failed to answer callback query: {}", e);
        }

        let Some(sender) = sender_from(&query.from) else {
            return;
        };
        let data = query.data.clone().unwrap_or_default();
        self.metrics
            .callbacks
            .with_label_values(&[action_label(&data)])
            .inc();

        let target = Target {
            chat_id: query
                .message
                .as_ref()
                .map_or(ChatId(sender.user_id), |m| m.chat().id),
            message_id: query.message.as_ref().map(|m| m.id()),
        };
        self.respond(&sender, Inbound::Callback(data), target).await;
    }

    async fn respond(&self, sender: &Sender, event: Inbound, target: Target) {
        let replies = self.flow.handle(sender, event).await;
        for reply in &replies {
            if let Err(e) = render::deliver(&self.bot, target, reply).await {
                self.metrics.telegram_errors.inc();
                log::error!("Failed to deliver reply to user {}: {}", sender.user_id, e);
            }
        }
    }
}

/// User the update belongs to, used to keep per-user ordering.
pub fn update_user_id(update: &Update) -> Option<i64> {
    update.from().and_then(|user| i64::try_from(user.id.0).ok())
}

fn sender_from(user: &User) -> Option<Sender> {
    let user_id = i64::try_from(user.id.0).ok()?;
    Some(Sender {
        user_id,
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()),
        last_name: user.last_name.clone(),
        language_code: user.language_code.clone(),
    })
}

/// `None` for message kinds the quiz does not react to (stickers, photos, ...).
pub fn inbound_from_message(message: &Message) -> Option<Inbound> {
    if let Some(contact) = message.contact() {
        return Some(Inbound::Contact {
            phone_number: contact.phone_number.clone(),
            owner_id: contact.user_id.and_then(|id| i64::try_from(id.0).ok()),
        });
    }

    let text = message.text()?;
    let command = text.split_whitespace().next().unwrap_or_default();
    // "/start@quiz_bot" in groups
    if command == "/start" || command.starts_with("/start@") {
        Some(Inbound::Start)
    } else {
        Some(Inbound::Text(text.to_string()))
    }
}

fn action_label(data: &str) -> &'static str {
    match data.parse::<CallbackAction>() {
        Ok(CallbackAction::Quiz) => "quiz",
        Ok(CallbackAction::Answer(_)) => "answer",
        Ok(CallbackAction::Stats) => "stats",
        Ok(CallbackAction::Menu) => "menu",
        Ok(CallbackAction::About) => "about",
        Ok(CallbackAction::EndSession) => "end_session",
        Ok(CallbackAction::Report) => "report",
        Ok(CallbackAction::ReportReason { .. }) => "report_reason",
        Ok(CallbackAction::BackToAnswer) => "back_to_answer",
        Ok(CallbackAction::CheckSubscription) => "check_subscription",
        Err(_) => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn message(extra: serde_json::Value) -> Message {
        let mut raw = serde_json::json!({
            "message_id": 10,
            "date": 1_700_000_000,
            "chat": {"id": 42, "type": "private", "first_name": "Sam"},
            "from": {"id": 42, "is_bot": false, "first_name": "Sam", "language_code": "ar"}
        });
        if let (Some(target), Some(extra)) = (raw.as_object_mut(), extra.as_object()) {
            target.extend(extra.clone());
        }
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_start_command() {
        assert_eq!(
            inbound_from_message(&message(serde_json::json!({"text": "/start"}))),
            Some(Inbound::Start)
        );
        assert_eq!(
            inbound_from_message(&message(serde_json::json!({"text": "/start@quiz_bot payload"}))),
            Some(Inbound::Start)
        );
        assert_eq!(
            inbound_from_message(&message(serde_json::json!({"text": "/startle"}))),
            Some(Inbound::Text("/startle".to_string()))
        );
    }

    #[test]
    fn test_contact_carries_owner() {
        let msg = message(serde_json::json!({
            "contact": {"phone_number": "+10000000000", "first_name": "Sam", "user_id": 42}
        }));
        assert_eq!(
            inbound_from_message(&msg),
            Some(Inbound::Contact {
                phone_number: "+10000000000".to_string(),
                owner_id: Some(42)
            })
        );
    }

    #[test]
    fn test_sender_profile() {
        let msg = message(serde_json::json!({"text": "hi"}));
        let sender = msg.from.as_ref().and_then(sender_from).unwrap();
        assert_eq!(sender.user_id, 42);
        assert_eq!(sender.first_name.as_deref(), Some("Sam"));
        assert_eq!(sender.language_code.as_deref(), Some("ar"));
    }

    #[test]
    fn test_update_user_id_for_callbacks() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 5,
            "callback_query": {
                "id": "cb1",
                "from": {"id": 77, "is_bot": false, "first_name": "Lee"},
                "chat_instance": "ci",
                "data": "quiz"
            }
        }))
        .unwrap();
        assert_eq!(update_user_id(&update), Some(77));
    }

    #[test]
    fn test_action_labels() {
        assert_eq!(action_label("answer_C"), "answer");
        assert_eq!(action_label("report_other_3"), "report_reason");
        assert_eq!(action_label("bogus"), "unknown");
    }
}
