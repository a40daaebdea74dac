//! Platform-neutral description of an outgoing message.
//!
//! The flow produces these, the bot layer turns them into API calls.

use crate::callback::CallbackAction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonTarget {
    Callback(CallbackAction),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub target: ButtonTarget,
}

impl Button {
    pub fn callback(label: impl Into<String>, action: CallbackAction) -> Self {
        Self {
            label: label.into(),
            target: ButtonTarget::Callback(action),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            target: ButtonTarget::Url(url.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Keyboard {
    #[default]
    None,
    /// Inline buttons, one inner vec per row
    Inline(Vec<Vec<Button>>),
    /// One-time reply keyboard asking for the user's phone number
    RequestContact(String),
    /// Remove a previously shown reply keyboard
    Remove,
}

/// Whether to post a new message or edit the one the button was pressed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Delivery {
    #[default]
    Send,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Keyboard,
    pub delivery: Delivery,
}

impl Reply {
    pub fn send(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Keyboard::None,
            delivery: Delivery::Send,
        }
    }

    pub fn edit(text: impl Into<String>) -> Self {
        Self {
            delivery: Delivery::Edit,
            ..Self::send(text)
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }

    pub fn with_buttons(self, rows: Vec<Vec<Button>>) -> Self {
        self.with_keyboard(Keyboard::Inline(rows))
    }

    /// Callback data of every inline button, row by row.
    pub fn callback_actions(&self) -> Vec<CallbackAction> {
        match &self.keyboard {
            Keyboard::Inline(rows) => rows
                .iter()
                .flatten()
                .filter_map(|b| match &b.target {
                    ButtonTarget::Callback(action) => Some(*action),
                    ButtonTarget::Url(_) => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn urls(&self) -> Vec<&str> {
        match &self.keyboard {
            Keyboard::Inline(rows) => rows
                .iter()
                .flatten()
                .filter_map(|b| match &b.target {
                    ButtonTarget::Url(url) => Some(url.as_str()),
                    ButtonTarget::Callback(_) => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}
