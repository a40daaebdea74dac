//! Process startup for both run modes.
//!
//! `serve` binds the HTTP listener first and initializes in the background,
//! so `/health` and `/env` answer even when credentials are broken.
//! `run` initializes up front and then long-polls through teloxide's `Polling` listener.

use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use once_cell::sync::OnceCell;
use quizcore::{FlowSettings, QuestionPicker, QuizFlow, QuizStore, SubscriptionGate, SupabaseStore};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use teloxide::prelude::*;
use teloxide::types::Update;
use teloxide::update_listeners::{AsUpdateStream, Polling};
use teloxide::RequestError;
use tokio::net::TcpListener;

use crate::config::{self, Credentials};
use crate::dispatch::{DispatchBridge, DispatchError};
use crate::metrics::Metrics;
use crate::server;
use crate::telegram::{self, QuizRouter, TelegramMembership};

/// How updates reach the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Webhook,
    Polling,
}

/// Result of one initialization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Ready,
    /// Another attempt is still running
    InProgress,
    Failed(String),
}

/// What a successful initialization produced.
pub struct Initialized {
    pub router: Arc<QuizRouter>,
    pub bot_username: Option<String>,
    pub question_count: Option<u64>,
}

/// Shared by the HTTP handlers and the polling loop.
pub struct AppState {
    pub bridge: DispatchBridge,
    pub metrics: Arc<Metrics>,
    pub mode: Mode,
    pub webhook_secret: Option<String>,
    router: OnceCell<Arc<QuizRouter>>,
    bot_username: OnceCell<String>,
    question_count: OnceCell<u64>,
    init_error: Mutex<Option<String>>,
    initializing: AtomicBool,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
}

impl AppState {
    pub fn new(bridge: DispatchBridge, metrics: Arc<Metrics>, mode: Mode, webhook_secret: Option<String>) -> Self {
        Self {
            bridge,
            metrics,
            mode,
            webhook_secret,
            router: OnceCell::new(),
            bot_username: OnceCell::new(),
            question_count: OnceCell::new(),
            init_error: Mutex::new(None),
            initializing: AtomicBool::new(false),
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.bridge.is_ready() && self.router.get().is_some()
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::SeqCst)
    }

    pub fn router(&self) -> Option<Arc<QuizRouter>> {
        self.router.get().cloned()
    }

    pub fn bot_username(&self) -> Option<&str> {
        self.bot_username.get().map(String::as_str)
    }

    pub fn question_count(&self) -> Option<u64> {
        self.question_count.get().copied()
    }

    /// Last initialization failure, verbatim.
    pub fn init_error(&self) -> Option<String> {
        self.init_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at_utc
    }

    /// Publish a built router and open the bridge for submissions.
    pub fn install(&self, initialized: Initialized) {
        let _ = self.router.set(initialized.router);
        if let Some(username) = initialized.bot_username {
            let _ = self.bot_username.set(username);
        }
        if let Some(count) = initialized.question_count {
            let _ = self.question_count.set(count);
        }
        *self.init_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.bridge.mark_ready();
    }

    fn record_failure(&self, error: String) {
        log::error!("CRITICAL: initialization failed: {}", error);
        self.bridge.mark_not_ready();
        *self.init_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }
}

/// Run one initialization on the dispatch worker unless already ready.
pub async fn initialize(state: Arc<AppState>) -> InitOutcome {
    if state.is_ready() {
        return InitOutcome::Ready;
    }
    if state.initializing.swap(true, Ordering::SeqCst) {
        log::info!("Initialization already in progress");
        return InitOutcome::InProgress;
    }

    log::info!("Initializing bot ({:?} mode)", state.mode);
    let job = build(Arc::clone(&state.metrics), state.mode);
    let outcome = match state.bridge.run(job, config::dispatch::init_timeout()).await {
        Ok(Ok(initialized)) => {
            state.install(initialized);
            log::info!("✅ Bot initialized, accepting updates");
            InitOutcome::Ready
        }
        Ok(Err(e)) => {
            let error = format!("{e:#}");
            state.record_failure(error.clone());
            InitOutcome::Failed(error)
        }
        Err(e) => {
            let error = e.to_string();
            state.record_failure(error.clone());
            InitOutcome::Failed(error)
        }
    };

    state.initializing.store(false, Ordering::SeqCst);
    outcome
}

/// Everything that touches the network at startup. Runs on the dispatch worker.
async fn build(metrics: Arc<Metrics>, mode: Mode) -> anyhow::Result<Initialized> {
    let credentials = Credentials::from_env()?;

    let bot = telegram::create_bot(&credentials.telegram_token)?;
    let me = bot.get_me().await?;
    let bot_username = me.username.clone();
    log::info!("Authorized as @{}", bot_username.as_deref().unwrap_or("?"));

    if let Err(e) = telegram::setup_bot_commands(&bot).await {
        log::warn!("Failed to register bot commands: {}", e);
    }

    match mode {
        Mode::Webhook => match config::WEBHOOK_URL.as_deref() {
            Some(url) => telegram::register_webhook(&bot, url, config::WEBHOOK_SECRET.as_deref()).await?,
            None => log::warn!("WEBHOOK_URL not set, assuming the webhook is registered externally"),
        },
        Mode::Polling => {
            bot.delete_webhook().await?;
        }
    }

    let store: Arc<dyn QuizStore> = Arc::new(SupabaseStore::connect(
        &credentials.supabase_url,
        &credentials.supabase_key,
    )?);
    let question_count = match store.count_questions().await {
        Ok(count) => {
            log::info!("Question store reachable, {} questions", count);
            Some(count)
        }
        Err(e) => {
            log::warn!("Question store ping failed: {}", e);
            None
        }
    };

    let ttl = Duration::from_secs(*config::SUBSCRIPTION_CACHE_TTL_SECS);
    let gate = match config::CHANNEL_ID.as_deref() {
        Some(channel) if *config::REQUIRE_SUBSCRIPTION => {
            let probe = TelegramMembership::new(bot.clone(), channel, Arc::clone(&metrics));
            Arc::new(SubscriptionGate::new(Arc::new(probe), true, ttl))
        }
        _ => Arc::new(SubscriptionGate::disabled()),
    };
    let picker = QuestionPicker::new(Arc::clone(&store), *config::QUESTION_PAGE_SIZE);
    let settings = FlowSettings {
        free_questions: *config::FREE_QUESTIONS_LIMIT,
        channel_link: config::CHANNEL_INVITE_LINK.clone(),
    };
    let flow = Arc::new(QuizFlow::new(store, picker, gate, settings));
    spawn_cleanup(Arc::clone(&flow), ttl, Duration::from_secs(*config::SESSION_IDLE_SECS));

    Ok(Initialized {
        router: Arc::new(QuizRouter::new(bot, flow, metrics)),
        bot_username,
        question_count,
    })
}

/// Periodically expire membership answers and idle sessions.
fn spawn_cleanup(flow: Arc<QuizFlow>, ttl: Duration, session_idle: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ttl.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            if flow.gate().is_enabled() {
                flow.gate().cleanup().await;
            }
            flow.sessions().cleanup(session_idle);
        }
    });
}

/// Server mode: HTTP listener first, initialization in the background.
///
/// `port` overrides the `PORT` environment variable.
pub async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new()?);
    let bridge = DispatchBridge::start(*config::dispatch::QUEUE_CAPACITY)?;
    let state = Arc::new(AppState::new(
        bridge,
        metrics,
        Mode::Webhook,
        config::WEBHOOK_SECRET.clone(),
    ));

    let addr = listen_addr(port);
    let listener = TcpListener::bind(&addr).await?;
    log::info!("Listening on http://{}", addr);
    log::info!("  /webhook - Telegram updates");
    log::info!("  /health  - Liveness and readiness");
    log::info!("  /init    - Retry initialization");
    log::info!("  /env     - Configuration diagnostics");
    log::info!("  /metrics - Prometheus metrics");

    tokio::spawn(initialize(Arc::clone(&state)));

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("Server stopped");
    Ok(())
}

fn listen_addr(port: Option<u16>) -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(*config::PORT)))
}

/// Standalone mode: initialize, then long-poll and feed the bridge.
pub async fn run_polling() -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new()?);
    let bridge = DispatchBridge::start(*config::dispatch::QUEUE_CAPACITY)?;
    let state = Arc::new(AppState::new(bridge, metrics, Mode::Polling, None));

    if let InitOutcome::Failed(error) = initialize(Arc::clone(&state)).await {
        anyhow::bail!("initialization failed: {}", error);
    }
    let router = state
        .router()
        .ok_or_else(|| anyhow::anyhow!("router missing after initialization"))?;
    let bot = router.bot().clone();

    let mut listener = Polling::builder(bot)
        .timeout(Duration::from_secs(config::network::POLL_TIMEOUT_SECS))
        .build();

    log::info!("Polling for updates");
    tokio::select! {
        result = forward_updates(&state, &router, listener.as_stream()) => result?,
        _ = tokio::signal::ctrl_c() => log::info!("Received Ctrl+C, stopping"),
    }
    Ok(())
}

/// Feed a stream of polled updates into the bridge, waiting for free slots.
async fn forward_updates<S>(state: &AppState, router: &Arc<QuizRouter>, updates: S) -> anyhow::Result<()>
where
    S: Stream<Item = Result<Update, RequestError>>,
{
    tokio::pin!(updates);
    while let Some(next) = updates.next().await {
        let update = match next {
            Ok(update) => update,
            Err(e) => {
                state.metrics.telegram_errors.inc();
                log::warn!("getUpdates failed: {}", e);
                continue;
            }
        };

        let (user_id, job) = router.job(update);
        match state.bridge.submit_wait(user_id, job).await {
            Ok(()) => state.metrics.updates_received.with_label_values(&["polling"]).inc(),
            Err(e) => {
                state.metrics.updates_rejected.with_label_values(&[e.label()]).inc();
                if e == DispatchError::Stopped {
                    anyhow::bail!("dispatch worker stopped");
                }
                log::error!("Dropping update: {}", e);
            }
        }
        state.metrics.queue_depth.set(state.bridge.queue_depth() as i64);
    }
    log::info!("Update stream ended");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Received Ctrl+C, shutting down");
}

/// Offline router for tests: in-memory store, no gate, Bot API pointed at a closed port.
#[cfg(test)]
pub(crate) fn test_initialized(metrics: Arc<Metrics>) -> Initialized {
    use quizcore::MemoryStore;

    let bot = Bot::new("123456:TEST").set_api_url(url::Url::parse("http://127.0.0.1:9/").unwrap());
    let store: Arc<dyn QuizStore> = Arc::new(MemoryStore::new());
    let picker = QuestionPicker::new(Arc::clone(&store), 50);
    let flow = Arc::new(QuizFlow::new(
        store,
        picker,
        Arc::new(SubscriptionGate::disabled()),
        FlowSettings::default(),
    ));
    Initialized {
        router: Arc::new(QuizRouter::new(bot, flow, metrics)),
        bot_username: Some("quiz_test_bot".to_string()),
        question_count: Some(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state() -> Arc<AppState> {
        let bridge = DispatchBridge::start(4).unwrap();
        Arc::new(AppState::new(bridge, Arc::new(Metrics::new().unwrap()), Mode::Webhook, None))
    }

    #[tokio::test]
    async fn test_install_opens_the_bridge() {
        let state = state();
        state.record_failure("bot token rejected".to_string());
        assert!(!state.is_ready());
        assert_eq!(state.init_error().as_deref(), Some("bot token rejected"));

        state.install(test_initialized(Arc::clone(&state.metrics)));

        assert!(state.is_ready());
        assert!(state.bridge.is_ready());
        assert_eq!(state.init_error(), None);
        assert_eq!(state.bot_username(), Some("quiz_test_bot"));
        assert_eq!(initialize(Arc::clone(&state)).await, InitOutcome::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_drops_idle_sessions() {
        use quizcore::{MemoryStore, OptionTag, Question};

        let store: Arc<dyn QuizStore> = Arc::new(MemoryStore::new());
        let picker = QuestionPicker::new(Arc::clone(&store), 50);
        let flow = Arc::new(QuizFlow::new(
            store,
            picker,
            Arc::new(SubscriptionGate::disabled()),
            FlowSettings::default(),
        ));
        let question = Question {
            id: 1,
            prompt: "Which vessel supplies the SA node?".to_string(),
            option_a: "RCA".to_string(),
            option_b: "LAD".to_string(),
            option_c: "LCx".to_string(),
            option_d: "PDA".to_string(),
            correct_answer: OptionTag::A,
            explanation: None,
            added_at: None,
        };
        flow.sessions().begin_question(42, &question);

        spawn_cleanup(Arc::clone(&flow), Duration::from_secs(1), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(flow.sessions().active_sessions(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(flow.sessions().active_sessions(), 0);
    }

    fn polled(update_id: i32, user_id: i64) -> Update {
        serde_json::from_value(serde_json::json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "date": 1700000000,
                "chat": {"id": user_id, "type": "private", "first_name": "Sam"},
                "from": {"id": user_id, "is_bot": false, "first_name": "Sam"},
                "text": "hello"
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_forward_updates_counts_errors_and_deliveries() {
        let state = state();
        state.install(test_initialized(Arc::clone(&state.metrics)));
        let router = state.router().unwrap();

        let updates = futures_util::stream::iter(vec![
            Err(RequestError::Api(teloxide::ApiError::BotBlocked)),
            Ok(polled(1, 42)),
            Ok(polled(2, 43)),
        ]);
        forward_updates(&state, &router, updates).await.unwrap();

        assert_eq!(state.metrics.telegram_errors.get(), 1);
        assert_eq!(state.metrics.updates_received.with_label_values(&["polling"]).get(), 2);
    }

    #[tokio::test]
    async fn test_forward_updates_drops_when_not_ready() {
        let state = state();
        let router = test_initialized(Arc::clone(&state.metrics)).router;

        let updates = futures_util::stream::iter(vec![Ok(polled(1, 42))]);
        forward_updates(&state, &router, updates).await.unwrap();

        assert_eq!(state.metrics.updates_rejected.with_label_values(&["not_ready"]).get(), 1);
        assert_eq!(state.metrics.updates_received.with_label_values(&["polling"]).get(), 0);
    }

    #[test]
    fn test_listen_addr_prefers_explicit_port() {
        assert_eq!(listen_addr(Some(9443)).port(), 9443);
        assert_eq!(listen_addr(None).port(), *config::PORT);
        assert!(listen_addr(Some(9443)).ip().is_unspecified());
    }

    #[tokio::test]
    async fn test_concurrent_initialization_is_refused() {
        let state = state();
        state.initializing.store(true, Ordering::SeqCst);
        assert_eq!(initialize(Arc::clone(&state)).await, InitOutcome::InProgress);
        assert!(!state.is_ready());
    }
}
