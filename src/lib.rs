//! Core library entry points for the medrag medical-query service.

pub mod api;
pub mod calculator;
pub mod classifier;
pub mod config;
pub mod eutils;
pub mod evidence;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod search;
pub mod statistics;

pub use api::{router, AppState};
pub use calculator::{calculate, CalculationError, CalculationResult};
pub use classifier::{Classification, ClassifierRules, RuleTable};
pub use config::{PipelineArgs, PipelineSettings};
pub use eutils::{EutilsClient, LiteratureSource};
pub use evidence::{fetch_evidence, EvidenceBundle};
pub use pipeline::{Pipeline, PipelineError, Query, ResponseEnvelope};
pub use prompt::{ComposedPrompt, Composer, PlatformIdentity};
pub use providers::{build_provider, GenerationParams, GenerationRequest, LlmProvider};
pub use pubmed_parser::BibliographicRecord;
pub use search::{RecordId, SearchExpression, SearchRequest, SearchSettings, SearchStrategy};
pub use statistics::{detect, CalculationInput, CalculationKind, StatisticalIntent};

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "medrag=info,tower_http=info";
