//! Pipeline construction: explicit wiring for tests and embedding, or
//! everything at once from an [`AppConfig`].

use crate::fallback::FallbackCatalog;
use crate::knowledge::KeywordKnowledge;
use crate::pipeline::{Pipeline, SamplingConfig};
use crate::prompt::PromptBuilder;
use crate::writer::BackgroundWriter;
use maitre_config::{AppConfig, ClassifierConfig, PersonaConfig};
use maitre_core::{Error, KnowledgeProvider, NoKnowledge, ProfileStore, Provider};
use maitre_intent::{EntityExtractor, IntentClassifier};
use maitre_memory::{
    ContextStore, DEFAULT_MAX_PAIRS, DEFAULT_TTL, FileProfileStore, InMemoryProfileStore,
    NoopProfileStore, SqliteProfileStore,
};
use maitre_providers::{RetryPolicy, build_from_config, model_for};
use maitre_security::{OutputPolicy, OutputValidator};
use maitre_telemetry::{JsonlSink, PricingTable, TelemetryRecorder};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_MAX_INPUT_CHARS: usize = 2000;

pub struct PipelineBuilder {
    provider: Arc<dyn Provider>,
    classifier: IntentClassifier,
    context: Arc<ContextStore>,
    sweep_interval: Option<Duration>,
    retry: RetryPolicy,
    sampling: SamplingConfig,
    output: OutputPolicy,
    max_input_chars: usize,
    persona: PersonaConfig,
    knowledge: Arc<dyn KnowledgeProvider>,
    profiles: Arc<dyn ProfileStore>,
    telemetry: Option<Arc<TelemetryRecorder>>,
    queue_capacity: usize,
}

impl PipelineBuilder {
    /// Defaults everywhere: in-memory profiles, no knowledge, no telemetry.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            classifier: IntentClassifier::new(),
            context: Arc::new(ContextStore::new(DEFAULT_MAX_PAIRS, DEFAULT_TTL)),
            sweep_interval: Some(DEFAULT_SWEEP_INTERVAL),
            retry: RetryPolicy::default(),
            sampling: SamplingConfig {
                model: "openai/gpt-4o-mini".into(),
                temperature: 0.7,
                max_tokens: Some(500),
            },
            output: OutputPolicy::default(),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            persona: PersonaConfig::default(),
            knowledge: Arc::new(NoKnowledge),
            profiles: Arc::new(InMemoryProfileStore::new()),
            telemetry: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Wire every collaborator from configuration.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let router = build_from_config(config);
        let provider = router.default()?;
        let model = model_for(config, &config.default_provider);

        let output = OutputPolicy {
            max_len: config.output.max_output_chars,
            min_len: config.output.min_output_chars,
            repetition_window: config.output.repetition_window,
            sentence_tail_fraction: config.output.sentence_tail_fraction,
        };

        let knowledge: Arc<dyn KnowledgeProvider> = if config.knowledge.is_empty() {
            Arc::new(NoKnowledge)
        } else {
            Arc::new(KeywordKnowledge::new(&config.knowledge))
        };

        let telemetry = config.telemetry.enabled.then(|| {
            let sink = JsonlSink::new(config.telemetry.resolved_log_path());
            Arc::new(TelemetryRecorder::new(
                PricingTable::from_config(&config.telemetry),
                Arc::new(sink),
            ))
        });

        info!(
            provider = %config.default_provider,
            model = %model,
            profiles = %config.profile.backend,
            telemetry = config.telemetry.enabled,
            "Pipeline configured"
        );

        Ok(Self::new(provider)
            .with_classifier(classifier_from_config(&config.classifier))
            .with_context_store(Arc::new(ContextStore::new(
                config.context.max_pairs,
                config.context.ttl(),
            )))
            .with_sweep_interval(Some(config.context.sweep_interval()))
            .with_retry(RetryPolicy::from(&config.retry))
            .with_sampling(SamplingConfig {
                model,
                temperature: config.default_temperature,
                max_tokens: Some(config.default_max_tokens),
            })
            .with_output_policy(output)
            .with_max_input_chars(config.output.max_input_chars)
            .with_persona(config.persona.clone())
            .with_knowledge(knowledge)
            .with_profiles(open_profile_store(config).await?)
            .with_telemetry(telemetry)
            .with_queue_capacity(config.queue.capacity))
    }

    pub fn with_classifier(mut self, classifier: IntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_context_store(mut self, context: Arc<ContextStore>) -> Self {
        self.context = context;
        self
    }

    /// `None` disables the background sweep; expired windows are still
    /// ignored on read.
    pub fn with_sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_output_policy(mut self, output: OutputPolicy) -> Self {
        self.output = output;
        self
    }

    pub fn with_max_input_chars(mut self, max: usize) -> Self {
        self.max_input_chars = max;
        self
    }

    pub fn with_persona(mut self, persona: PersonaConfig) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeProvider>) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileStore>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Option<Arc<TelemetryRecorder>>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Spawns the background writer and the context sweeper, so this must
    /// run inside a tokio runtime.
    pub fn build(self) -> Pipeline {
        let writer = BackgroundWriter::spawn(
            self.queue_capacity,
            self.telemetry.clone(),
            Arc::clone(&self.profiles),
        );
        let sweeper = self
            .sweep_interval
            .filter(|interval| !interval.is_zero())
            .map(|interval| self.context.spawn_sweeper(interval));

        Pipeline {
            classifier: self.classifier,
            context: self.context,
            provider: self.provider,
            retry: self.retry,
            sampling: self.sampling,
            validator: OutputValidator::new(self.output),
            max_input_chars: self.max_input_chars,
            fallback: FallbackCatalog::new(),
            prompt: PromptBuilder::new(self.persona),
            knowledge: self.knowledge,
            profiles: self.profiles,
            telemetry: self.telemetry,
            writer,
            sweeper,
        }
    }
}

/// The classifier with configured thresholds and extra location aliases.
pub fn classifier_from_config(config: &ClassifierConfig) -> IntentClassifier {
    let extractor = EntityExtractor::new().with_locations(
        config
            .locations
            .iter()
            .map(|(tag, aliases)| (tag.clone(), aliases.clone())),
    );
    IntentClassifier::new()
        .with_fuzzy_threshold(config.fuzzy_threshold)
        .with_min_token_chars(config.min_token_chars)
        .with_extractor(extractor)
}

async fn open_profile_store(config: &AppConfig) -> Result<Arc<dyn ProfileStore>, Error> {
    let store: Arc<dyn ProfileStore> = match config.profile.backend.as_str() {
        "memory" => Arc::new(InMemoryProfileStore::new()),
        "none" => Arc::new(NoopProfileStore),
        "file" => Arc::new(FileProfileStore::open(config.profile.resolved_path()).await),
        "sqlite" => {
            let path = config.profile.resolved_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::Config {
                    message: format!("Cannot create {}: {e}", parent.display()),
                })?;
            }
            Arc::new(SqliteProfileStore::new(&format!("sqlite://{}", path.display())).await?)
        }
        other => {
            return Err(Error::Config {
                message: format!("Unknown profile backend '{other}'"),
            });
        }
    };
    Ok(store)
}
