//! Request orchestration: classify, retrieve, calculate, compose, generate.

use std::fmt;
use std::sync::Arc;

use pubmed_parser::BibliographicRecord;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calculator::{calculate, CalculationResult};
use crate::classifier::{Classification, ClassifierRules, RuleTable};
use crate::config::PipelineSettings;
use crate::eutils::LiteratureSource;
use crate::evidence::{fetch_evidence, EvidenceBundle};
use crate::prompt::{ComposedPrompt, Composer};
use crate::providers::{GenerationRequest, LlmProvider};
use crate::search::{search_with_fallback, SearchStrategy};
use crate::statistics::{detect, CalculationKind};

/// Characters of trailing conversation context kept with a query.
pub const MAX_CONTEXT_CHARS: usize = 1500;

/// Caller-facing message for model failures; details stay in the logs.
pub const MODEL_FAILURE_MESSAGE: &str = "the language model failed to produce an answer";

/// A validated incoming question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub message: String,
    /// Tail of the caller's conversation, at most [`MAX_CONTEXT_CHARS`] characters.
    pub context: Option<String>,
}

impl Query {
    /// Rejects empty messages and trims context to its last
    /// [`MAX_CONTEXT_CHARS`] characters.
    pub fn new(message: &str, context: Option<&str>) -> Result<Self, PipelineError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(PipelineError::Input("message must not be empty".to_string()));
        }
        let context = context
            .map(str::trim)
            .filter(|ctx| !ctx.is_empty())
            .map(tail_chars);
        Ok(Self {
            message: message.to_string(),
            context,
        })
    }
}

fn tail_chars(text: &str) -> String {
    let count = text.chars().count();
    if count <= MAX_CONTEXT_CHARS {
        return text.to_string();
    }
    text.chars().skip(count - MAX_CONTEXT_CHARS).collect()
}

/// Failures that reach the caller. Everything else degrades silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The request carried no usable message.
    Input(String),
    /// No language-model credentials were configured.
    Configuration(String),
    /// The language-model call failed, timed out or returned nothing.
    Model(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(msg) => write!(f, "invalid request: {msg}"),
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::Model(msg) => write!(f, "model error: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

/// The only externally observable output of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub response_text: String,
    pub evidence_used: bool,
    pub citation_count: usize,
    pub citations: Vec<BibliographicRecord>,
    pub calculation_performed: bool,
    pub calculation_kind: Option<CalculationKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation: Option<CalculationResult>,
    pub search_strategy_label: &'static str,
    pub classification: Classification,
}

/// Everything computed before the model call.
#[derive(Debug, Clone)]
pub struct PreparedAnswer {
    pub classification: Classification,
    pub strategy: SearchStrategy,
    pub evidence: EvidenceBundle,
    pub calculation: Option<CalculationResult>,
    pub prompt: ComposedPrompt,
}

impl PreparedAnswer {
    fn into_envelope(self, response_text: String) -> ResponseEnvelope {
        ResponseEnvelope {
            response_text,
            evidence_used: !self.evidence.is_empty(),
            citation_count: self.evidence.citations.len(),
            citations: self.evidence.citations,
            calculation_performed: self.calculation.is_some(),
            calculation_kind: self.calculation.as_ref().map(|calc| calc.kind),
            calculation: self.calculation,
            search_strategy_label: self.strategy.label(),
            classification: self.classification,
        }
    }
}

/// Per-process pipeline; holds no per-request state.
pub struct Pipeline {
    settings: PipelineSettings,
    source: Arc<dyn LiteratureSource>,
    provider: Option<Arc<dyn LlmProvider>>,
    classifier: RuleTable,
    composer: Composer,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        source: Arc<dyn LiteratureSource>,
        provider: Option<Arc<dyn LlmProvider>>,
        rules: &ClassifierRules,
    ) -> Self {
        let composer = Composer::new(settings.identity().clone());
        Self {
            settings,
            source,
            provider,
            classifier: RuleTable::from_rules(rules),
            composer,
        }
    }

    /// Whether a language model is configured.
    pub fn has_model(&self) -> bool {
        self.provider.is_some()
    }

    /// Answers one question end to end.
    ///
    /// Input and configuration problems are rejected before any stage runs.
    pub async fn answer(
        &self,
        message: &str,
        context: Option<&str>,
    ) -> Result<ResponseEnvelope, PipelineError> {
        let query = Query::new(message, context)?;
        let provider = self.provider.clone().ok_or_else(|| {
            PipelineError::Configuration("no language model API key configured".to_string())
        })?;

        let prepared = self.prepare(&query).await;
        let prompt = match &prepared.prompt {
            ComposedPrompt::Canned(text) => {
                let text = text.clone();
                return Ok(prepared.into_envelope(text));
            }
            ComposedPrompt::Model(prompt) => prompt.clone(),
        };

        let request = GenerationRequest {
            prompt,
            params: *self.settings.generation(),
        };
        let timeout = self.settings.model_timeout();
        let text = match tokio::time::timeout(timeout, provider.generate(&request)).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!(provider = provider.name(), error = %format!("{err:#}"), "model call failed");
                return Err(PipelineError::Model(MODEL_FAILURE_MESSAGE.to_string()));
            }
            Err(_) => {
                warn!(
                    provider = provider.name(),
                    timeout_secs = timeout.as_secs_f64(),
                    "model call timed out"
                );
                return Err(PipelineError::Model(MODEL_FAILURE_MESSAGE.to_string()));
            }
        };
        Ok(prepared.into_envelope(text))
    }

    /// Runs every stage up to, but not including, the model call.
    pub async fn prepare(&self, query: &Query) -> PreparedAnswer {
        let classification = self.classifier.classify(&query.message);
        info!(?classification, "query classified");

        if classification == Classification::Identity {
            let prompt =
                self.composer
                    .compose(classification, query, &EvidenceBundle::default(), None);
            return PreparedAnswer {
                classification,
                strategy: SearchStrategy::NotApplicable,
                evidence: EvidenceBundle::default(),
                calculation: None,
                prompt,
            };
        }

        let (strategy, evidence) = if classification == Classification::Clinical {
            let outcome =
                search_with_fallback(self.source.as_ref(), &query.message, self.settings.search())
                    .await;
            let evidence = fetch_evidence(
                self.source.as_ref(),
                &outcome.ids,
                self.settings.max_records(),
                self.settings.search().timeout,
            )
            .await;
            (outcome.strategy, evidence)
        } else {
            (SearchStrategy::NotApplicable, EvidenceBundle::default())
        };

        let calculation = run_calculation(&query.message);
        let prompt = self
            .composer
            .compose(classification, query, &evidence, calculation.as_ref());
        PreparedAnswer {
            classification,
            strategy,
            evidence,
            calculation,
            prompt,
        }
    }
}

fn run_calculation(message: &str) -> Option<CalculationResult> {
    let intent = detect(message);
    let kind = intent.kind?;
    let Some(input) = intent.parameters else {
        debug!(%kind, "calculation recognised without enough numbers");
        return None;
    };
    match calculate(&input) {
        Ok(result) => {
            info!(%kind, value = result.value, "calculation performed");
            Some(result)
        }
        Err(err) => {
            warn!(%kind, error = %err, "calculation rejected");
            None
        }
    }
}
