//! End-to-end tests for the maitre response pipeline.
//!
//! These drive `Pipeline::respond` from raw user text to the reply string
//! with a scripted generation backend, covering classification, retries,
//! fallbacks, the output firewall, context expiry and persistence.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use maitre_core::error::ProviderError;
use maitre_core::{
    ChannelKind, IntentKind, ProfileField, ProfileStore, Provider, ProviderRequest,
    ProviderResponse, Usage,
};
use maitre_memory::{ContextStore, FileProfileStore, InMemoryProfileStore};
use maitre_pipeline::{Pipeline, PipelineBuilder, ReplySource, RespondRequest};
use maitre_providers::RetryPolicy;
use maitre_security::{APOLOGY, DIDNT_UNDERSTAND, RejectReason};
use maitre_telemetry::{JsonlSink, PricingTable, TelemetryRecorder, TelemetrySink};
use parking_lot::Mutex;
use tokio::time::Instant;

// ── Mock Provider ────────────────────────────────────────────────────────

/// Returns scripted outcomes in sequence, then a stock reply. Records the
/// request and the (virtual) instant of every call.
struct ScriptedProvider {
    outcomes: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedProvider {
    fn new(outcomes: Vec<Result<String, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            requests: Mutex::new(Vec::new()),
            call_times: Mutex::new(Vec::new()),
        })
    }

    fn text(reply: &str) -> Arc<Self> {
        Self::new(vec![Ok(reply.to_string())])
    }

    fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    fn system_prompt(&self, call: usize) -> String {
        self.requests.lock()[call].messages[0].content.clone()
    }

    /// Gaps between consecutive calls.
    fn gaps(&self) -> Vec<Duration> {
        let times = self.call_times.lock();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.call_times.lock().push(Instant::now());
        self.requests.lock().push(request);
        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok("Хорошо, записал.".to_string()));
        outcome.map(|content| ProviderResponse {
            content,
            usage: Some(Usage {
                prompt_tokens: 200,
                completion_tokens: 40,
                total_tokens: 240,
            }),
            model: "openai/gpt-4o-mini".into(),
        })
    }
}

fn connection_refused() -> Result<String, ProviderError> {
    Err(ProviderError::Network("connection refused".into()))
}

fn pipeline(provider: Arc<ScriptedProvider>) -> Pipeline {
    PipelineBuilder::new(provider)
        .with_sweep_interval(None)
        .build()
}

// ── Scenario 1: booking intent and entities ──────────────────────────────

#[tokio::test]
async fn e2e_booking_request_is_classified_with_entities() {
    let provider =
        ScriptedProvider::text("Отлично! Стол на завтра в 19:30 на четверых забронирован.");
    let pipeline = pipeline(provider.clone());

    let reply = pipeline
        .respond(RespondRequest::new("guest-1", "хочу стол на завтра в 19:30 на 4 человек"))
        .await;

    assert_eq!(reply.intent.intent, IntentKind::Booking);
    assert_eq!(reply.intent.entities.date.as_deref(), Some("завтра"));
    assert_eq!(reply.intent.entities.time.as_deref(), Some("19:30"));
    assert_eq!(reply.intent.entities.people_count, Some(4));
    assert_eq!(reply.source, ReplySource::Generated);
    assert_eq!(provider.calls(), 1);

    let system = provider.system_prompt(0);
    assert!(system.contains("- время: 19:30"));
    assert!(system.contains("- гостей: 4"));
}

// ── Scenario 2: outage → backoff → booking fallback ──────────────────────

#[tokio::test(start_paused = true)]
async fn e2e_transport_outage_backs_off_then_serves_booking_fallback() {
    let provider = ScriptedProvider::new(vec![
        connection_refused(),
        connection_refused(),
        connection_refused(),
    ]);
    let pipeline = PipelineBuilder::new(provider.clone())
        .with_retry(RetryPolicy {
            max_retries: 3,
            ..RetryPolicy::default()
        })
        .with_sweep_interval(None)
        .build();

    let reply = pipeline
        .respond(RespondRequest::new("guest-2", "хочу стол на завтра в 19:30 на 4 человек"))
        .await;

    assert_eq!(provider.calls(), 3);
    assert_eq!(
        provider.gaps(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
    assert_eq!(reply.source, ReplySource::Fallback);
    assert_eq!(reply.intent.intent, IntentKind::Booking);
    assert!(reply.text.contains("завтра, в 19:30, гостей: 4"), "{}", reply.text);
    assert!(!reply.text.contains("connection refused"));
}

#[tokio::test(start_paused = true)]
async fn e2e_fatal_error_is_not_retried() {
    let provider = ScriptedProvider::new(vec![Err(ProviderError::AuthenticationFailed(
        "invalid key".into(),
    ))]);
    let pipeline = pipeline(provider.clone());

    let started = Instant::now();
    let reply = pipeline
        .respond(RespondRequest::new("guest-3", "Здравствуйте!").with_channel(ChannelKind::Group))
        .await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(reply.source, ReplySource::Fallback);
    assert_eq!(reply.intent.intent, IntentKind::Greeting);
    assert!(!reply.text.is_empty());
}

// ── Scenario 3: empty input ──────────────────────────────────────────────

#[tokio::test]
async fn e2e_empty_input_returns_didnt_understand_without_backend() {
    let provider = ScriptedProvider::new(vec![]);
    let pipeline = pipeline(provider.clone());

    for raw in ["", "   \n\t ", "<script>document.cookie</script>"] {
        let reply = pipeline.respond(RespondRequest::new("guest-4", raw)).await;
        assert_eq!(reply.text, DIDNT_UNDERSTAND);
        assert_eq!(reply.source, ReplySource::EmptyInput);
    }
    assert_eq!(provider.calls(), 0);
}

// ── Classifier priority through the pipeline ─────────────────────────────

#[tokio::test]
async fn e2e_complaint_wins_over_greeting() {
    let provider = ScriptedProvider::text("Простите нас, пожалуйста. Я передам менеджеру.");
    let pipeline = pipeline(provider.clone());

    let reply = pipeline
        .respond(RespondRequest::new("guest-5", "Добрый вечер. Обслуживание было ужасно"))
        .await;

    assert_eq!(reply.intent.intent, IntentKind::Complaint);
    assert!(provider.system_prompt(0).contains("Гость недоволен"));
}

// ── Output firewall ──────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_traceback_never_reaches_the_user() {
    let provider = ScriptedProvider::text(
        "Traceback (most recent call last):\n  File \"bot.py\", line 12, in <module>",
    );
    let pipeline = pipeline(provider);

    let reply = pipeline
        .respond(RespondRequest::new("guest-6", "какие у вас десерты?"))
        .await;

    assert_eq!(reply.text, APOLOGY);
    assert_eq!(reply.source, ReplySource::Rejected(RejectReason::ErrorLeak));
}

#[tokio::test]
async fn e2e_runaway_repetition_is_cut() {
    let provider = ScriptedProvider::text(
        "Мы работаем каждый день с полудня. Мы работаем каждый день с полудня. Мы работаем",
    );
    let pipeline = pipeline(provider);

    let reply = pipeline
        .respond(RespondRequest::new("guest-7", "до скольки вы работаете?"))
        .await;

    assert_eq!(reply.source, ReplySource::Generated);
    assert_eq!(reply.text.matches("Мы работаем каждый день").count(), 1);
}

// ── Context window and expiry ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn e2e_context_expires_after_ttl() {
    let provider = ScriptedProvider::new(vec![]);
    let profiles = Arc::new(InMemoryProfileStore::new());
    let pipeline = PipelineBuilder::new(provider.clone())
        .with_context_store(Arc::new(ContextStore::new(2, Duration::from_secs(60))))
        .with_profiles(profiles.clone())
        .with_sweep_interval(Some(Duration::from_secs(30)))
        .build();

    pipeline.respond(RespondRequest::new("guest-8", "привет")).await;
    pipeline.respond(RespondRequest::new("guest-8", "что в меню?")).await;
    assert_eq!(pipeline.context().get("guest-8").len(), 4);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(pipeline.context().get("guest-8").is_empty());

    pipeline.respond(RespondRequest::new("guest-8", "снова я")).await;
    let last = provider.requests.lock().last().cloned().unwrap();
    assert_eq!(last.messages.len(), 2, "only system and current message");

    pipeline.flush().await;
    assert_eq!(
        profiles.get("guest-8", ProfileField::VisitCount).await.unwrap(),
        Some(serde_json::json!(2))
    );
    pipeline.shutdown().await;
}

#[tokio::test]
async fn e2e_window_is_bounded() {
    let provider = ScriptedProvider::new(vec![]);
    let pipeline = PipelineBuilder::new(provider.clone())
        .with_context_store(Arc::new(ContextStore::new(2, Duration::from_secs(600))))
        .with_sweep_interval(None)
        .build();

    for i in 0..6 {
        pipeline
            .respond(RespondRequest::new("guest-9", format!("вопрос номер {i}")))
            .await;
        assert!(pipeline.context().get("guest-9").len() <= 4);
    }
    let window = pipeline.context().get("guest-9");
    assert_eq!(window[0].text, "вопрос номер 4");
}

// ── Persistence across restarts ──────────────────────────────────────────

#[tokio::test]
async fn e2e_profile_and_telemetry_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let profile_path = dir.path().join("profiles.json");
    let log_path = dir.path().join("telemetry.jsonl");

    let recorder = |path: &std::path::Path| {
        Arc::new(TelemetryRecorder::new(
            PricingTable::with_defaults(),
            Arc::new(JsonlSink::new(path)),
        ))
    };

    let first = PipelineBuilder::new(ScriptedProvider::new(vec![]))
        .with_profiles(Arc::new(FileProfileStore::open(&profile_path).await))
        .with_telemetry(Some(recorder(&log_path)))
        .with_sweep_interval(None)
        .build();
    first
        .respond(RespondRequest::new("guest-10", "Меня зовут Пётр, обожаю ваш борщ"))
        .await;
    first.shutdown().await;

    let provider = ScriptedProvider::new(vec![]);
    let second = PipelineBuilder::new(provider.clone())
        .with_profiles(Arc::new(FileProfileStore::open(&profile_path).await))
        .with_telemetry(Some(recorder(&log_path)))
        .with_sweep_interval(None)
        .build();
    second
        .respond(RespondRequest::new("guest-10", "что посоветуете на ужин?"))
        .await;

    let system = provider.system_prompt(0);
    assert!(system.contains("- имя: Пётр"), "{system}");
    assert!(system.contains("- любит: борщ"), "{system}");

    let telemetry = second.telemetry().cloned().unwrap();
    second.shutdown().await;

    let records = telemetry.sink().read_all().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.user_id == "guest-10" && r.success));
    let days = telemetry.daily_rollups().unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0].rollup.calls, 2);
    assert_eq!(days[0].rollup.total_tokens, 480);
}
