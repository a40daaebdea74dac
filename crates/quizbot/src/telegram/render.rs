//! Turns flow replies into Bot API calls.

use quizcore::{Button, ButtonTarget, Delivery, Keyboard, Reply};
use teloxide::prelude::*;
use teloxide::types::{
    ButtonRequest, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, KeyboardRemove,
    MessageId, ReplyMarkup,
};
use teloxide::{ApiError, RequestError};

/// Where a reply goes: the chat, and the message to edit if there is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub chat_id: ChatId,
    pub message_id: Option<MessageId>,
}

pub fn inline_markup(rows: &[Vec<Button>]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = rows
        .iter()
        .map(|row| row.iter().filter_map(inline_button).collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect();
    InlineKeyboardMarkup::new(rows)
}

fn inline_button(button: &Button) -> Option<InlineKeyboardButton> {
    match &button.target {
        ButtonTarget::Callback(action) => Some(InlineKeyboardButton::callback(
            button.label.clone(),
            action.to_string(),
        )),
        ButtonTarget::Url(raw) => match url::Url::parse(raw) {
            Ok(url) => Some(InlineKeyboardButton::url(button.label.clone(), url)),
            Err(e) => {
                log::warn!("Dropping button {:?}: invalid URL {}: {}", button.label, raw, e);
                None
            }
        },
    }
}

/// Markup for a new message, `None` when the reply carries no keyboard.
pub fn reply_markup(keyboard: &Keyboard) -> Option<ReplyMarkup> {
    match keyboard {
        Keyboard::None => None,
        Keyboard::Inline(rows) => Some(ReplyMarkup::InlineKeyboard(inline_markup(rows))),
        Keyboard::RequestContact(label) => {
            let button = KeyboardButton::new(label.clone()).request(ButtonRequest::Contact);
            Some(ReplyMarkup::Keyboard(
                KeyboardMarkup::new(vec![vec![button]])
                    .resize_keyboard()
                    .one_time_keyboard(),
            ))
        }
        Keyboard::Remove => Some(ReplyMarkup::KeyboardRemove(KeyboardRemove::new())),
    }
}

/// Only inline keyboards survive an edit; anything else needs a new message.
fn editable(reply: &Reply) -> bool {
    reply.delivery == Delivery::Edit && matches!(reply.keyboard, Keyboard::None | Keyboard::Inline(_))
}

/// Deliver one reply.
///
/// Edits fall back to a fresh message when the original cannot be edited.
/// Telegram's "message is not modified" answer counts as success.
pub async fn deliver(bot: &Bot, target: Target, reply: &Reply) -> Result<(), RequestError> {
    if let (true, Some(message_id)) = (editable(reply), target.message_id) {
        let mut request = bot.edit_message_text(target.chat_id, message_id, reply.text.clone());
        if let Keyboard::Inline(rows) = &reply.keyboard {
            request = request.reply_markup(inline_markup(rows));
        }

        match request.await {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => return Ok(()),
            Err(e) => log::warn!(
                "Failed to edit message {} in chat {}, sending a new one: {}",
                message_id.0,
                target.chat_id,
                e
            ),
        }
    }

    let mut request = bot.send_message(target.chat_id, reply.text.clone());
    if let Some(markup) = reply_markup(&reply.keyboard) {
        request = request.reply_markup(markup);
    }
    request.await?;
    Ok(())
}
