//! The response pipeline.
//!
//! One call to [`Pipeline::respond`]:
//!
//! 1. **Sanitize** the raw text; empty input short-circuits with the
//!    "didn't understand" reply and never reaches the backend
//! 2. **Classify** intent and extract entities
//! 3. **Assemble** the prompt from persona, intent guidance, knowledge,
//!    profile facts and the context window
//! 4. **Call** the backend through the retry wrapper; terminal failures are
//!    answered from the fallback catalog
//! 5. **Validate** generated text through the content firewall
//! 6. **Remember** the exchange in the context store
//! 7. **Queue** telemetry and profile updates on the background writer
//!
//! `respond` always produces a reply; no error reaches the caller.

use crate::fallback::FallbackCatalog;
use crate::profile::{self, ProfileFacts};
use crate::prompt::{PromptBuilder, PromptInput};
use crate::writer::{BackgroundWriter, WriteJob};
use chrono::Utc;
use maitre_core::{
    ChannelKind, IntentResult, KnowledgeProvider, ProfileStore, Provider,
    ProviderRequest, ProviderResponse, Turn,
};
use maitre_intent::IntentClassifier;
use maitre_memory::ContextStore;
use maitre_providers::{RetryError, RetryPolicy, call_with_retry};
use maitre_security::{DIDNT_UNDERSTAND, OutputValidator, RejectReason, Validated, sanitize_input};
use maitre_telemetry::{CallStats, TelemetryRecorder};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Inbound request.
#[derive(Debug, Clone, Default)]
pub struct RespondRequest {
    pub user_id: String,
    pub raw_text: String,
    pub channel: ChannelKind,
    /// Used instead of the stored context window when set.
    pub prior_turns_override: Option<Vec<Turn>>,
}

impl RespondRequest {
    pub fn new(user_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            raw_text: raw_text.into(),
            ..Self::default()
        }
    }

    pub fn with_channel(mut self, channel: ChannelKind) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_prior_turns(mut self, turns: Vec<Turn>) -> Self {
        self.prior_turns_override = Some(turns);
        self
    }
}

/// Where the reply text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum ReplySource {
    /// Validated backend output.
    Generated,
    /// The validator rejected the backend output.
    Rejected(RejectReason),
    /// The backend failed; canned reply.
    Fallback,
    /// Nothing left after sanitizing.
    EmptyInput,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub text: String,
    pub intent: IntentResult,
    pub source: ReplySource,
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// Orchestrates one conversational turn. Cheap to share behind an `Arc`.
pub struct Pipeline {
    pub(crate) classifier: IntentClassifier,
    pub(crate) context: Arc<ContextStore>,
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) retry: RetryPolicy,
    pub(crate) sampling: SamplingConfig,
    pub(crate) validator: OutputValidator,
    pub(crate) max_input_chars: usize,
    pub(crate) fallback: FallbackCatalog,
    pub(crate) prompt: PromptBuilder,
    pub(crate) knowledge: Arc<dyn KnowledgeProvider>,
    pub(crate) profiles: Arc<dyn ProfileStore>,
    pub(crate) telemetry: Option<Arc<TelemetryRecorder>>,
    pub(crate) writer: BackgroundWriter,
    pub(crate) sweeper: Option<JoinHandle<()>>,
}

impl Pipeline {
    pub fn context(&self) -> &Arc<ContextStore> {
        &self.context
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn writer(&self) -> &BackgroundWriter {
        &self.writer
    }

    pub fn telemetry(&self) -> Option<&Arc<TelemetryRecorder>> {
        self.telemetry.as_ref()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn respond(&self, request: RespondRequest) -> Reply {
        let RespondRequest {
            user_id,
            raw_text,
            channel,
            prior_turns_override,
        } = request;

        let text = sanitize_input(&raw_text, self.max_input_chars);
        if text.is_empty() {
            debug!(user_id = %user_id, "Empty input after sanitizing");
            return Reply {
                text: DIDNT_UNDERSTAND.to_string(),
                intent: self.classifier.classify(""),
                source: ReplySource::EmptyInput,
            };
        }

        let intent = self.classifier.classify(&text);
        info!(
            user_id = %user_id,
            intent = %intent.intent,
            confidence = intent.confidence,
            "Processing message"
        );

        let (history, new_session) = match prior_turns_override {
            Some(turns) => (turns, false),
            None => {
                let turns = self.context.get(&user_id);
                let fresh = turns.is_empty();
                (turns, fresh)
            }
        };

        let knowledge = match self.knowledge.find_relevant_info(&text).await {
            Ok(info) => info,
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "Knowledge lookup failed, continuing without it"
                );
                String::new()
            }
        };
        let facts: ProfileFacts = profile::load_facts(self.profiles.as_ref(), &user_id).await;

        let messages = self.prompt.build(&PromptInput {
            intent: &intent,
            channel,
            knowledge: &knowledge,
            profile: &facts,
            history: &history,
            user_text: &text,
        });
        let backend_request = ProviderRequest {
            model: self.sampling.model.clone(),
            messages,
            temperature: self.sampling.temperature,
            max_tokens: self.sampling.max_tokens,
        };

        let started = Instant::now();
        let outcome = call_with_retry(&self.retry, |_| {
            let provider = Arc::clone(&self.provider);
            let request = backend_request.clone();
            async move { provider.complete(request).await }
        })
        .await;
        let latency = started.elapsed();

        let (reply_text, source, stats) = match outcome {
            Ok(response) => self.accept_or_reject(&user_id, response, latency),
            Err(error) => self.degrade(&user_id, &intent, channel, &error, latency),
        };

        self.context.append_exchange(&user_id, text.as_str(), reply_text.as_str());

        if let Some(recorder) = &self.telemetry {
            self.writer.submit(WriteJob::Telemetry(recorder.make_record(stats)));
        }
        let updates = profile::mine(&text, &intent, new_session, Utc::now());
        if !updates.is_empty() {
            self.writer.submit(WriteJob::Profile {
                user_id: user_id.clone(),
                updates,
            });
        }

        Reply {
            text: reply_text,
            intent,
            source,
        }
    }

    fn accept_or_reject(
        &self,
        user_id: &str,
        response: ProviderResponse,
        latency: std::time::Duration,
    ) -> (String, ReplySource, CallStats) {
        let usage = response.usage.unwrap_or_default();
        let model = if response.model.is_empty() {
            self.sampling.model.clone()
        } else {
            response.model
        };

        let (text, source, error) = match self.validator.validate(&response.content) {
            Validated::Accepted(text) => (text, ReplySource::Generated, None),
            Validated::Rejected { reason, message } => (
                message.to_string(),
                ReplySource::Rejected(reason),
                Some(format!("output rejected: {reason}")),
            ),
        };

        let stats = CallStats {
            user_id: user_id.to_string(),
            model,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            latency,
            success: error.is_none(),
            error,
        };
        (text, source, stats)
    }

    fn degrade(
        &self,
        user_id: &str,
        intent: &IntentResult,
        channel: ChannelKind,
        error: &RetryError,
        latency: std::time::Duration,
    ) -> (String, ReplySource, CallStats) {
        warn!(
            user_id,
            intent = %intent.intent,
            attempts = error.attempts(),
            error = %error,
            "Backend unavailable, serving fallback"
        );
        let text = self
            .fallback
            .get_fallback(intent.intent, &intent.entities, channel);
        let stats = CallStats {
            user_id: user_id.to_string(),
            model: self.sampling.model.clone(),
            prompt_tokens: 0,
            completion_tokens: 0,
            latency,
            success: false,
            error: Some(error.to_string()),
        };
        (text, ReplySource::Fallback, stats)
    }

    /// Forget a user's conversation window.
    pub fn reset(&self, user_id: &str) {
        self.context.clear(user_id);
    }

    /// Wait for queued telemetry and profile writes.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    /// Stop the sweeper and drain the background writer.
    pub async fn shutdown(self) {
        if let Some(sweeper) = self.sweeper {
            sweeper.abort();
        }
        self.writer.shutdown().await;
    }
}
