use async_trait::async_trait;
use quizcore::{AppError, AppResult, MembershipProbe, MembershipStatus};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ChatMemberKind, Recipient, UserId};

use crate::metrics::Metrics;

/// Channel membership via `getChatMember`.
pub struct TelegramMembership {
    bot: Bot,
    channel: Recipient,
    metrics: Arc<Metrics>,
}

impl TelegramMembership {
    pub fn new(bot: Bot, channel: &str, metrics: Arc<Metrics>) -> Self {
        Self {
            bot,
            channel: parse_channel(channel),
            metrics,
        }
    }
}

/// `@name` (or a bare name) becomes a channel username, digits become a chat id.
pub fn parse_channel(channel: &str) -> Recipient {
    let channel = channel.trim();
    match channel.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) if channel.starts_with('@') => Recipient::ChannelUsername(channel.to_string()),
        Err(_) => Recipient::ChannelUsername(format!("@{channel}")),
    }
}

pub fn map_member_kind(kind: &ChatMemberKind) -> MembershipStatus {
    if kind.is_owner() {
        MembershipStatus::Creator
    } else if kind.is_administrator() {
        MembershipStatus::Administrator
    } else if kind.is_member() {
        MembershipStatus::Member
    } else if kind.is_restricted() {
        MembershipStatus::Restricted {
            is_member: kind.is_present(),
        }
    } else if kind.is_left() {
        MembershipStatus::Left
    } else {
        MembershipStatus::Banned
    }
}

#[async_trait]
impl MembershipProbe for TelegramMembership {
    async fn membership(&self, user_id: i64) -> AppResult<MembershipStatus> {
        let telegram_id = u64::try_from(user_id)
            .map_err(|_| AppError::Validation(format!("invalid Telegram user id {user_id}")))?;

        let member = match self
            .bot
            .get_chat_member(self.channel.clone(), UserId(telegram_id))
            .await
        {
            Ok(member) => member,
            Err(e) => {
                self.metrics.membership_checks.with_label_values(&["error"]).inc();
                return Err(e.into());
            }
        };

        let status = map_member_kind(&member.kind);
        let outcome = if status.is_subscribed() {
            "subscribed"
        } else {
            "not_subscribed"
        };
        self.metrics.membership_checks.with_label_values(&[outcome]).inc();
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_channel() {
        assert_eq!(parse_channel("-1001234567890"), Recipient::Id(ChatId(-1001234567890)));
        assert_eq!(
            parse_channel("@med_quiz"),
            Recipient::ChannelUsername("@med_quiz".to_string())
        );
        assert_eq!(
            parse_channel(" med_quiz "),
            Recipient::ChannelUsername("@med_quiz".to_string())
        );
    }

    fn member(status: serde_json::Value) -> MembershipStatus {
        let mut raw = serde_json::json!({
            "user": {"id": 42, "is_bot": false, "first_name": "Sam"}
        });
        if let (Some(target), Some(extra)) = (raw.as_object_mut(), status.as_object()) {
            target.extend(extra.clone());
        }
        let member: teloxide::types::ChatMember = serde_json::from_value(raw).unwrap();
        map_member_kind(&member.kind)
    }

    #[test]
    fn test_map_api_statuses() {
        assert_eq!(member(serde_json::json!({"status": "member"})), MembershipStatus::Member);
        assert_eq!(member(serde_json::json!({"status": "left"})), MembershipStatus::Left);
        assert_eq!(
            member(serde_json::json!({"status": "creator", "is_anonymous": false})),
            MembershipStatus::Creator
        );
        assert_eq!(
            member(serde_json::json!({"status": "kicked", "until_date": 0})),
            MembershipStatus::Banned
        );
    }
}
