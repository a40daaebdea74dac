//! Quiz conversation state machine.
//!
//! `QuizFlow::handle` takes one inbound event for one user and returns the
//! replies to deliver. It never returns an error: store and platform failures
//! are logged and turned into a short user-visible message.

use crate::callback::CallbackAction;
use crate::gate::SubscriptionGate;
use crate::model::{AnswerFilter, NewAnswer, OptionTag, ReportReason, UserProfile, UserStats};
use crate::reply::{Button, Keyboard, Reply};
use crate::selection::{QuestionPicker, Selection};
use crate::session::{ActiveQuestion, SessionStore};
use crate::store::QuizStore;
use crate::texts;
use chrono::Utc;
use std::sync::Arc;

/// Number of questions a user may answer before gating applies
pub const DEFAULT_FREE_QUESTIONS: u64 = 10;

/// Who sent the event, as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
}

impl Sender {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    fn profile(&self) -> UserProfile {
        UserProfile {
            telegram_id: self.user_id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            language_code: self.language_code.clone(),
            ..Default::default()
        }
    }
}

/// One inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// The `/start` command
    Start,
    /// A shared contact; `owner_id` is the platform user the contact belongs to
    Contact { phone_number: String, owner_id: Option<i64> },
    /// Any other text message
    Text(String),
    /// Raw callback data from an inline button
    Callback(String),
}

#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub free_questions: u64,
    /// Invite link shown on the subscription prompt
    pub channel_link: Option<String>,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            free_questions: DEFAULT_FREE_QUESTIONS,
            channel_link: None,
        }
    }
}

pub struct QuizFlow {
    store: Arc<dyn QuizStore>,
    picker: QuestionPicker,
    sessions: SessionStore,
    gate: Arc<SubscriptionGate>,
    settings: FlowSettings,
}

impl QuizFlow {
    pub fn new(
        store: Arc<dyn QuizStore>,
        picker: QuestionPicker,
        gate: Arc<SubscriptionGate>,
        settings: FlowSettings,
    ) -> Self {
        Self {
            store,
            picker,
            sessions: SessionStore::new(),
            gate,
            settings,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn gate(&self) -> &SubscriptionGate {
        &self.gate
    }

    pub async fn handle(&self, sender: &Sender, event: Inbound) -> Vec<Reply> {
        self.touch(sender.user_id);

        match event {
            Inbound::Start => self.on_start(sender).await,
            Inbound::Contact {
                phone_number,
                owner_id,
            } => self.on_contact(sender, phone_number, owner_id).await,
            Inbound::Text(_) => vec![Reply::send(texts::USE_BUTTONS).with_buttons(self.menu_rows(true))],
            Inbound::Callback(data) => match data.parse::<CallbackAction>() {
                Ok(action) => self.on_action(sender, action).await,
                Err(e) => {
                    log::warn!("User {}: {}", sender.user_id, e);
                    vec![Reply::edit(texts::PLEASE_RESTART)]
                }
            },
        }
    }

    async fn on_action(&self, sender: &Sender, action: CallbackAction) -> Vec<Reply> {
        let user_id = sender.user_id;
        log::debug!("User {} pressed {}", user_id, action);

        match action {
            CallbackAction::Quiz => vec![self.next_question(user_id).await],
            CallbackAction::Answer(tag) => vec![self.on_answer(user_id, tag).await],
            CallbackAction::Stats => {
                let stats = self.stats(user_id).await;
                vec![Reply::edit(texts::stats(&stats)).with_buttons(vec![
                    vec![Button::callback(texts::BTN_START_QUIZ, CallbackAction::Quiz)],
                    vec![Button::callback(texts::BTN_MENU, CallbackAction::Menu)],
                ])]
            }
            CallbackAction::Menu => {
                let subscribed = self.gate.is_subscribed(user_id).await;
                vec![Reply::edit(texts::MENU).with_buttons(self.menu_rows(subscribed))]
            }
            CallbackAction::About => vec![Reply::edit(texts::ABOUT).with_buttons(vec![vec![Button::callback(
                texts::BTN_MENU,
                CallbackAction::Menu,
            )]])],
            CallbackAction::EndSession => {
                self.sessions.end_session(user_id);
                let stats = self.stats(user_id).await;
                vec![Reply::edit(texts::session_ended(&stats)).with_buttons(vec![vec![Button::callback(
                    texts::BTN_START_QUIZ,
                    CallbackAction::Quiz,
                )]])]
            }
            CallbackAction::Report => vec![self.report_menu(user_id)],
            CallbackAction::ReportReason { reason, question_id } => {
                vec![self.file_report(user_id, question_id, reason).await]
            }
            CallbackAction::BackToAnswer => vec![self.back_to_answer(user_id)],
            CallbackAction::CheckSubscription => vec![self.check_subscription(user_id).await],
        }
    }

    async fn on_start(&self, sender: &Sender) -> Vec<Reply> {
        let user_id = sender.user_id;
        let existing = match self.store.get_user(user_id).await {
            Ok(user) => user,
            Err(e) => {
                log::error!("Failed to load user {}: {}", user_id, e);
                None
            }
        };

        let mut profile = sender.profile();
        if existing.is_none() {
            profile.joined_at = Some(Utc::now());
        }
        profile.last_interaction = Some(Utc::now());
        if let Err(e) = self.store.upsert_user(&profile).await {
            log::error!("Failed to save user {}: {}", user_id, e);
        }

        if existing.as_ref().is_some_and(UserProfile::has_phone) {
            vec![self.introduction().await]
        } else {
            log::info!("Requesting phone number from user {}", user_id);
            vec![Reply::send(texts::REQUEST_PHONE)
                .with_keyboard(Keyboard::RequestContact(texts::BTN_SHARE_PHONE.to_string()))]
        }
    }

    async fn on_contact(&self, sender: &Sender, phone_number: String, owner_id: Option<i64>) -> Vec<Reply> {
        let user_id = sender.user_id;
        if owner_id != Some(user_id) {
            log::warn!("User {} shared a contact that is not their own", user_id);
            return vec![Reply::send(texts::CONTACT_NOT_OWN)
                .with_keyboard(Keyboard::RequestContact(texts::BTN_SHARE_PHONE.to_string()))];
        }

        let profile = UserProfile {
            phone_number: Some(phone_number),
            last_interaction: Some(Utc::now()),
            ..sender.profile()
        };
        match self.store.upsert_user(&profile).await {
            Ok(()) => log::info!("Saved phone number for user {}", user_id),
            Err(e) => log::error!("Failed to save phone number for user {}: {}", user_id, e),
        }

        vec![
            Reply::send(texts::CONTACT_SAVED).with_keyboard(Keyboard::Remove),
            self.introduction().await,
        ]
    }

    async fn introduction(&self) -> Reply {
        let total = self.picker.total_questions().await;
        Reply::send(texts::introduction(total)).with_buttons(vec![
            vec![Button::callback(texts::BTN_START_QUIZ, CallbackAction::Quiz)],
            vec![
                Button::callback(texts::BTN_STATS, CallbackAction::Stats),
                Button::callback(texts::BTN_ABOUT, CallbackAction::About),
            ],
        ])
    }

    async fn next_question(&self, user_id: i64) -> Reply {
        let answered = self.picker.answered_count(user_id).await;

        if self.gate.is_enabled()
            && answered >= self.settings.free_questions
            && !self.gate.is_subscribed(user_id).await
        {
            log::info!("User {} reached the free limit ({} answered)", user_id, answered);
            return self.subscription_prompt(None);
        }

        match self.picker.pick_for(Some(user_id)).await {
            Selection::Picked(question) => {
                self.sessions.begin_question(user_id, &question);
                let total = self.picker.total_questions().await;
                let rows = OptionTag::all()
                    .map(|tag| {
                        vec![Button::callback(
                            texts::option_button(tag, question.option(tag)),
                            CallbackAction::Answer(tag),
                        )]
                    })
                    .collect();
                Reply::edit(texts::question(&question.prompt, answered + 1, total.max(answered + 1)))
                    .with_buttons(rows)
            }
            Selection::Exhausted => Reply::edit(texts::ALL_DONE).with_buttons(vec![
                vec![Button::callback(texts::BTN_STATS, CallbackAction::Stats)],
                vec![Button::callback(texts::BTN_MENU, CallbackAction::Menu)],
            ]),
            Selection::NoContent => Reply::edit(texts::NO_QUESTIONS)
                .with_buttons(vec![vec![Button::callback(texts::BTN_MENU, CallbackAction::Menu)]]),
        }
    }

    async fn on_answer(&self, user_id: i64, tag: OptionTag) -> Reply {
        if let Some(previous) = self.sessions.last_selection(user_id) {
            if let Some(active) = self.sessions.current_question(user_id) {
                log::debug!("User {} already answered question {}", user_id, active.question_id);
                return result_screen(&active, previous);
            }
        }

        let active = match self.sessions.record_selection(user_id, tag) {
            Ok(active) => active,
            Err(e) => {
                log::warn!("Rejected answer: {}", e);
                return Reply::edit(texts::PLEASE_RESTART);
            }
        };

        let is_correct = tag == active.correct;
        let record = NewAnswer {
            user_id,
            question_id: active.question_id,
            selected_answer: tag,
            correct_answer: active.correct,
            is_correct,
            answered_at: Utc::now(),
        };
        match self.store.insert_answer(&record).await {
            Ok(()) => log::info!(
                "User {} answered question {} with {} (correct: {})",
                user_id,
                active.question_id,
                tag,
                is_correct
            ),
            Err(e) => log::error!(
                "Failed to save answer of user {} to question {}: {}",
                user_id,
                active.question_id,
                e
            ),
        }

        result_screen(&active, tag)
    }

    fn report_menu(&self, user_id: i64) -> Reply {
        let Some(active) = self.sessions.current_question(user_id) else {
            return Reply::edit(texts::PLEASE_RESTART);
        };

        let mut rows: Vec<Vec<Button>> = ReportReason::all()
            .map(|reason| {
                vec![Button::callback(
                    reason.label(),
                    CallbackAction::ReportReason {
                        reason,
                        question_id: active.question_id,
                    },
                )]
            })
            .collect();
        rows.push(vec![Button::callback(texts::BTN_BACK, CallbackAction::BackToAnswer)]);
        Reply::edit(texts::REPORT_PROMPT).with_buttons(rows)
    }

    async fn file_report(&self, user_id: i64, question_id: i64, reason: ReportReason) -> Reply {
        let text = match self.store.mark_reported(user_id, question_id, reason.as_ref()).await {
            Ok(true) => {
                log::info!("User {} reported question {} ({})", user_id, question_id, reason);
                texts::REPORT_THANKS
            }
            Ok(false) => texts::REPORT_NOT_FOUND,
            Err(e) => {
                log::error!("Failed to save report of user {} on question {}: {}", user_id, question_id, e);
                texts::REPORT_FAILED
            }
        };
        Reply::edit(text).with_buttons(vec![
            vec![Button::callback(texts::BTN_NEXT, CallbackAction::Quiz)],
            vec![Button::callback(texts::BTN_MENU, CallbackAction::Menu)],
        ])
    }

    fn back_to_answer(&self, user_id: i64) -> Reply {
        match (
            self.sessions.current_question(user_id),
            self.sessions.last_selection(user_id),
        ) {
            (Some(active), Some(selected)) => result_screen(&active, selected),
            _ => Reply::edit(texts::PLEASE_RESTART),
        }
    }

    async fn check_subscription(&self, user_id: i64) -> Reply {
        if self.gate.refresh(user_id).await {
            log::info!("User {} confirmed channel subscription", user_id);
            Reply::edit(texts::SUBSCRIPTION_CONFIRMED)
                .with_buttons(vec![vec![Button::callback(texts::BTN_START_QUIZ, CallbackAction::Quiz)]])
        } else {
            self.subscription_prompt(Some(texts::STILL_NOT_SUBSCRIBED))
        }
    }

    fn subscription_prompt(&self, note: Option<&str>) -> Reply {
        let mut text = texts::subscription_required(self.settings.free_questions);
        if let Some(note) = note {
            text = format!("{note}\n\n{text}");
        }

        let mut rows = Vec::new();
        if let Some(link) = &self.settings.channel_link {
            rows.push(vec![Button::url(texts::BTN_JOIN_CHANNEL, link.clone())]);
        }
        rows.push(vec![Button::callback(
            texts::BTN_CHECK_SUBSCRIPTION,
            CallbackAction::CheckSubscription,
        )]);
        Reply::edit(text).with_buttons(rows)
    }

    fn menu_rows(&self, subscribed: bool) -> Vec<Vec<Button>> {
        let mut rows = vec![
            vec![Button::callback(texts::BTN_START_QUIZ, CallbackAction::Quiz)],
            vec![
                Button::callback(texts::BTN_STATS, CallbackAction::Stats),
                Button::callback(texts::BTN_ABOUT, CallbackAction::About),
            ],
        ];
        if !subscribed {
            if let Some(link) = &self.settings.channel_link {
                rows.push(vec![Button::url(texts::BTN_JOIN_CHANNEL, link.clone())]);
            }
            rows.push(vec![Button::callback(
                texts::BTN_CHECK_SUBSCRIPTION,
                CallbackAction::CheckSubscription,
            )]);
        }
        rows
    }

    async fn stats(&self, user_id: i64) -> UserStats {
        let correct = self
            .store
            .count_answers(user_id, AnswerFilter::Correct)
            .await
            .unwrap_or_else(|e| {
                log::error!("Failed to count correct answers for user {}: {}", user_id, e);
                0
            });
        UserStats {
            answered: self.picker.answered_count(user_id).await,
            correct,
            total_questions: self.picker.total_questions().await,
        }
    }

    /// Refresh `last_interaction` in the background.
    fn touch(&self, user_id: i64) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.touch_user(user_id, Utc::now()).await {
                log::warn!("Failed to update last interaction for user {}: {}", user_id, e);
            }
        });
    }
}

fn result_screen(active: &ActiveQuestion, selected: OptionTag) -> Reply {
    let text = texts::result(
        selected == active.correct,
        active.correct,
        active.option(active.correct),
        active.explanation.as_deref(),
    );
    Reply::edit(text).with_buttons(vec![
        vec![Button::callback(texts::BTN_NEXT, CallbackAction::Quiz)],
        vec![Button::callback(texts::BTN_REPORT, CallbackAction::Report)],
        vec![
            Button::callback(texts::BTN_MENU, CallbackAction::Menu),
            Button::callback(texts::BTN_END, CallbackAction::EndSession),
        ],
    ])
}
