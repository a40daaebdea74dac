//! End-to-end conversations through QuizFlow with an in-memory store
//!
//! Run with: cargo test -p quizcore --test quiz_flow_test

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use quizcore::gate::DEFAULT_TTL;
use quizcore::selection::DEFAULT_PAGE_SIZE;
use quizcore::texts;
use quizcore::{
    AppResult, ButtonTarget, CallbackAction, FlowSettings, Inbound, Keyboard, MemoryStore, MembershipProbe,
    MembershipStatus, OptionTag, Question, QuestionPicker, QuizFlow, Reply, Sender, SubscriptionGate,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const CHANNEL_LINK: &str = "https://t.me/+quizchannel";

#[derive(Default)]
struct SwitchableProbe {
    member: AtomicBool,
}

#[async_trait]
impl MembershipProbe for SwitchableProbe {
    async fn membership(&self, _user_id: i64) -> AppResult<MembershipStatus> {
        Ok(if self.member.load(Ordering::SeqCst) {
            MembershipStatus::Member
        } else {
            MembershipStatus::Left
        })
    }
}

fn question(id: i64, correct: OptionTag) -> Question {
    Question {
        id,
        prompt: format!("Question number {id}"),
        option_a: format!("first {id}"),
        option_b: format!("second {id}"),
        option_c: format!("third {id}"),
        option_d: format!("fourth {id}"),
        correct_answer: correct,
        explanation: Some(format!("Explanation {id}")),
        added_at: None,
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    probe: Arc<SwitchableProbe>,
    flow: QuizFlow,
}

impl Harness {
    fn new(questions: Vec<Question>, gated: bool) -> Self {
        let store = Arc::new(MemoryStore::with_questions(questions));
        let probe = Arc::new(SwitchableProbe::default());
        let gate = Arc::new(SubscriptionGate::new(probe.clone(), gated, DEFAULT_TTL));
        let flow = QuizFlow::new(
            store.clone(),
            QuestionPicker::new(store.clone(), DEFAULT_PAGE_SIZE),
            gate,
            FlowSettings {
                free_questions: 10,
                channel_link: Some(CHANNEL_LINK.to_string()),
            },
        );
        Self { store, probe, flow }
    }

    async fn send(&self, user_id: i64, event: Inbound) -> Vec<Reply> {
        self.flow.handle(&Sender::new(user_id), event).await
    }

    async fn press(&self, user_id: i64, action: CallbackAction) -> Reply {
        let mut replies = self.send(user_id, Inbound::Callback(action.to_string())).await;
        assert_eq!(replies.len(), 1, "one reply per button press");
        replies.remove(0)
    }
}

fn is_question(reply: &Reply) -> bool {
    reply.callback_actions() == OptionTag::all().map(CallbackAction::Answer).collect::<Vec<_>>()
}

#[tokio::test]
async fn test_new_user_shares_phone_and_sees_introduction() {
    let h = Harness::new((1..=3).map(|id| question(id, OptionTag::A)).collect(), false);

    let replies = h.send(100, Inbound::Start).await;
    assert_eq!(replies.len(), 1);
    assert!(matches!(replies[0].keyboard, Keyboard::RequestContact(_)));

    let replies = h
        .send(
            100,
            Inbound::Contact {
                phone_number: "+10000000000".to_string(),
                owner_id: Some(100),
            },
        )
        .await;

    assert_eq!(
        h.store.user(100).and_then(|u| u.phone_number).as_deref(),
        Some("+10000000000")
    );
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].keyboard, Keyboard::Remove);
    assert_eq!(replies[1].text, texts::introduction(3));
    assert!(replies[1].callback_actions().contains(&CallbackAction::Quiz));

    // A returning user with a phone goes straight to the introduction.
    let replies = h.send(100, Inbound::Start).await;
    assert_eq!(replies[0].text, texts::introduction(3));
}

#[tokio::test]
async fn test_foreign_contact_is_rejected() {
    let h = Harness::new(vec![question(1, OptionTag::A)], false);

    let replies = h
        .send(
            100,
            Inbound::Contact {
                phone_number: "+19999999999".to_string(),
                owner_id: Some(200),
            },
        )
        .await;

    assert_eq!(replies[0].text, texts::CONTACT_NOT_OWN);
    assert_eq!(h.store.user(100), None);
}

#[tokio::test]
async fn test_wrong_answer_shows_correct_option_text() {
    let h = Harness::new(vec![question(7, OptionTag::C)], false);

    let reply = h.press(1, CallbackAction::Quiz).await;
    assert!(is_question(&reply));
    assert!(reply.text.contains("Question number 7"));
    assert_eq!(h.flow.sessions().current_question(1).map(|q| q.correct), Some(OptionTag::C));

    let result = h.press(1, CallbackAction::Answer(OptionTag::B)).await;
    assert!(result.text.contains("Wrong answer"));
    assert!(result.text.contains("third 7"));
    assert!(result.text.contains("Explanation 7"));

    let rows = h.store.answers();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].selected_answer, OptionTag::B);
    assert_eq!(rows[0].correct_answer, OptionTag::C);
    assert!(!rows[0].is_correct);
}

#[tokio::test]
async fn test_quota_requires_subscription_until_confirmed() {
    let h = Harness::new((1..=15).map(|id| question(id, OptionTag::A)).collect(), true);

    for _ in 0..10 {
        let reply = h.press(1, CallbackAction::Quiz).await;
        assert!(is_question(&reply));
        h.press(1, CallbackAction::Answer(OptionTag::A)).await;
    }

    let prompt = h.press(1, CallbackAction::Quiz).await;
    assert!(!is_question(&prompt));
    assert_eq!(prompt.urls(), vec![CHANNEL_LINK]);
    assert!(prompt.callback_actions().contains(&CallbackAction::CheckSubscription));

    let still = h.press(1, CallbackAction::CheckSubscription).await;
    assert!(still.text.starts_with(texts::STILL_NOT_SUBSCRIBED));

    h.probe.member.store(true, Ordering::SeqCst);
    let confirmed = h.press(1, CallbackAction::CheckSubscription).await;
    assert_eq!(confirmed.text, texts::SUBSCRIPTION_CONFIRMED);

    let reply = h.press(1, CallbackAction::Quiz).await;
    assert!(is_question(&reply));
    assert!(reply.text.contains("11 / 15"));
}

#[tokio::test]
async fn test_menu_offers_join_only_when_not_subscribed() {
    let h = Harness::new(vec![question(1, OptionTag::A)], true);

    let menu = h.press(1, CallbackAction::Menu).await;
    assert!(menu.callback_actions().contains(&CallbackAction::CheckSubscription));

    h.probe.member.store(true, Ordering::SeqCst);
    h.press(1, CallbackAction::CheckSubscription).await;
    let menu = h.press(1, CallbackAction::Menu).await;
    assert!(!menu.callback_actions().contains(&CallbackAction::CheckSubscription));
    assert!(menu.urls().is_empty());
}

#[tokio::test]
async fn test_questions_never_repeat_until_completion() {
    let h = Harness::new((1..=8).map(|id| question(id, OptionTag::D)).collect(), false);
    let mut seen = HashSet::new();

    for _ in 0..8 {
        h.press(3, CallbackAction::Quiz).await;
        let active = h.flow.sessions().current_question(3).unwrap();
        assert!(seen.insert(active.question_id));
        h.press(3, CallbackAction::Answer(OptionTag::A)).await;
    }

    let done = h.press(3, CallbackAction::Quiz).await;
    assert_eq!(done.text, texts::ALL_DONE);
}

#[tokio::test]
async fn test_empty_store_reports_no_questions() {
    let h = Harness::new(Vec::new(), false);
    let reply = h.press(1, CallbackAction::Quiz).await;
    assert_eq!(reply.text, texts::NO_QUESTIONS);
}

#[tokio::test]
async fn test_store_outage_still_answers_user() {
    let h = Harness::new(vec![question(1, OptionTag::B)], false);
    h.press(1, CallbackAction::Quiz).await;
    h.store.set_unavailable(true);

    let result = h.press(1, CallbackAction::Answer(OptionTag::B)).await;
    assert!(result.text.contains("Correct answer!"));

    let next = h.press(1, CallbackAction::Quiz).await;
    assert_eq!(next.text, texts::NO_QUESTIONS);
}

#[tokio::test]
async fn test_free_text_points_to_buttons() {
    let h = Harness::new(Vec::new(), false);
    let replies = h.send(1, Inbound::Text("hello".to_string())).await;
    assert_eq!(replies[0].text, texts::USE_BUTTONS);
    assert!(matches!(
        &replies[0].keyboard,
        Keyboard::Inline(rows) if rows.iter().flatten().all(|b| matches!(b.target, ButtonTarget::Callback(_)))
    ));
}
