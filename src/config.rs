//! Command-line and environment configuration shared by the binaries.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::classifier::{ClassifierRules, DEFAULT_PLATFORM_NAME};
use crate::eutils::{EutilsClient, DEFAULT_EUTILS_BASE};
use crate::prompt::PlatformIdentity;
use crate::providers::{GenerationParams, ProviderKind, ProviderSettings};
use crate::search::SearchSettings;

/// Immutable knobs the pipeline reads per request.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    search: SearchSettings,
    max_records: usize,
    model_timeout: Duration,
    generation: GenerationParams,
    identity: PlatformIdentity,
}

impl PipelineSettings {
    /// Constructs a new set of pipeline settings.
    pub fn new(
        search: SearchSettings,
        max_records: usize,
        model_timeout: Duration,
        generation: GenerationParams,
        identity: PlatformIdentity,
    ) -> Self {
        Self {
            search,
            max_records,
            model_timeout,
            generation,
            identity,
        }
    }

    /// Result-count, recency and timeout bounds for literature search.
    pub fn search(&self) -> &SearchSettings {
        &self.search
    }

    /// Maximum number of records fetched and parsed per request.
    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Upper bound on a single language-model call.
    pub fn model_timeout(&self) -> Duration {
        self.model_timeout
    }

    pub fn generation(&self) -> &GenerationParams {
        &self.generation
    }

    pub fn identity(&self) -> &PlatformIdentity {
        &self.identity
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            search: SearchSettings::default(),
            max_records: 10,
            model_timeout: Duration::from_secs(30),
            generation: GenerationParams::default(),
            identity: PlatformIdentity::default(),
        }
    }
}

/// Pipeline arguments, flattened into each binary's CLI.
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// E-utilities base URL
    #[arg(long, env = "MEDRAG_EUTILS_BASE", default_value = DEFAULT_EUTILS_BASE)]
    pub eutils_base: String,

    /// NCBI API key (raises the E-utilities rate limit)
    #[arg(long, env = "NCBI_API_KEY", hide_env_values = true)]
    pub ncbi_api_key: Option<String>,

    /// Tool name reported to NCBI
    #[arg(long, env = "NCBI_TOOL")]
    pub ncbi_tool: Option<String>,

    /// Contact email reported to NCBI
    #[arg(long, env = "NCBI_EMAIL")]
    pub ncbi_email: Option<String>,

    /// Identifiers requested from each literature search
    #[arg(long, env = "MEDRAG_SEARCH_RESULTS", default_value_t = 10)]
    pub search_results: usize,

    /// Recency window of the primary search, in years
    #[arg(long, env = "MEDRAG_PRIMARY_YEARS", default_value_t = 5)]
    pub primary_years: u32,

    /// Recency window of the fallback search, in years
    #[arg(long, env = "MEDRAG_FALLBACK_YEARS", default_value_t = 10)]
    pub fallback_years: u32,

    /// Maximum records fetched and parsed per request
    #[arg(long, env = "MEDRAG_MAX_RECORDS", default_value_t = 10)]
    pub max_records: usize,

    /// Seconds before a literature search or fetch is abandoned
    #[arg(long, env = "MEDRAG_SEARCH_TIMEOUT_SECS", default_value_t = 10)]
    pub search_timeout_secs: u64,

    /// Seconds before a language-model call is abandoned
    #[arg(long, env = "MEDRAG_MODEL_TIMEOUT_SECS", default_value_t = 30)]
    pub model_timeout_secs: u64,

    /// Language-model provider
    #[arg(long, env = "MEDRAG_LLM_PROVIDER", value_enum, default_value = "gemini")]
    pub llm_provider: ProviderKind,

    /// Model identifier (defaults per provider)
    #[arg(long, env = "MEDRAG_LLM_MODEL")]
    pub llm_model: Option<String>,

    /// Base URL for the provider API (defaults per provider)
    #[arg(long, env = "MEDRAG_LLM_BASE")]
    pub llm_base_url: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Sampling temperature
    #[arg(long, env = "MEDRAG_TEMPERATURE", default_value_t = 0.3)]
    pub temperature: f32,

    /// Top-k sampling bound
    #[arg(long, env = "MEDRAG_TOP_K", default_value_t = 40)]
    pub top_k: u32,

    /// Nucleus sampling bound
    #[arg(long, env = "MEDRAG_TOP_P", default_value_t = 0.95)]
    pub top_p: f32,

    /// Maximum tokens the model may generate
    #[arg(long, env = "MEDRAG_MAX_OUTPUT_TOKENS", default_value_t = 2048)]
    pub max_output_tokens: u32,

    /// JSON file replacing the built-in classifier keyword tables
    #[arg(long, env = "MEDRAG_CLASSIFIER_RULES")]
    pub classifier_rules: Option<PathBuf>,

    /// Platform name used in identity answers
    #[arg(long, env = "MEDRAG_PLATFORM_NAME", default_value = DEFAULT_PLATFORM_NAME)]
    pub platform_name: String,

    /// Assistant name (defaults to "<platform> AI")
    #[arg(long, env = "MEDRAG_ASSISTANT_NAME")]
    pub assistant_name: Option<String>,

    /// Creator named in identity answers (defaults to "the <platform> team")
    #[arg(long, env = "MEDRAG_CREATOR")]
    pub creator: Option<String>,
}

impl PipelineArgs {
    /// Converts the parsed arguments into `PipelineSettings`.
    pub fn build_settings(&self) -> PipelineSettings {
        let search = SearchSettings {
            max_results: self.search_results.max(1),
            primary_recency_years: self.primary_years,
            fallback_recency_years: self.fallback_years.max(self.primary_years),
            timeout: Duration::from_secs(self.search_timeout_secs.max(1)),
        };
        let generation = GenerationParams {
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            max_output_tokens: self.max_output_tokens,
        };
        PipelineSettings::new(
            search,
            self.max_records,
            Duration::from_secs(self.model_timeout_secs.max(1)),
            generation,
            self.build_identity(),
        )
    }

    fn build_identity(&self) -> PlatformIdentity {
        let platform = self.platform_name.trim().to_string();
        PlatformIdentity {
            assistant_name: self
                .assistant_name
                .clone()
                .unwrap_or_else(|| format!("{platform} AI")),
            creator: self
                .creator
                .clone()
                .unwrap_or_else(|| format!("the {platform} team")),
            platform_name: platform,
        }
    }

    /// Provider selection plus the matching credential.
    pub fn build_provider_settings(&self) -> ProviderSettings {
        let kind = self.llm_provider;
        let api_key = match kind {
            ProviderKind::Gemini => self.gemini_api_key.clone(),
            ProviderKind::OpenAi => self.openai_api_key.clone(),
        };
        ProviderSettings {
            kind,
            api_key,
            model: self
                .llm_model
                .clone()
                .unwrap_or_else(|| kind.default_model().to_string()),
            base_url: self
                .llm_base_url
                .clone()
                .unwrap_or_else(|| kind.default_base_url().to_string()),
            timeout: Duration::from_secs(self.model_timeout_secs.max(1)),
        }
    }

    /// E-utilities client bounded by the search timeout.
    pub fn build_literature_client(&self) -> Result<EutilsClient> {
        EutilsClient::new(
            &self.eutils_base,
            self.ncbi_api_key.clone(),
            self.ncbi_tool.clone(),
            self.ncbi_email.clone(),
            Duration::from_secs(self.search_timeout_secs.max(1)),
        )
    }

    /// Classifier tables from `--classifier-rules`, or the built-in defaults
    /// for the configured platform name.
    pub fn load_rules(&self) -> Result<ClassifierRules> {
        match &self.classifier_rules {
            Some(path) => ClassifierRules::from_json_file(path),
            None => Ok(ClassifierRules::for_platform(self.platform_name.trim())),
        }
    }
}
