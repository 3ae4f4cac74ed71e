//! Literature search planning: query-syntax expansion, study-type filters and
//! the single broader fallback search.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classifier::padded_words;
use crate::eutils::LiteratureSource;

/// Domain term to query-syntax mapping. Every replacement is fully quoted and
/// field-tagged so a second substitution pass leaves it untouched.
const TERM_MAP: &[(&str, &str)] = &[
    ("type 2 diabetes", r#"("diabetes mellitus, type 2"[MeSH Terms] OR "type 2 diabetes"[Title/Abstract])"#),
    ("type 1 diabetes", r#"("diabetes mellitus, type 1"[MeSH Terms] OR "type 1 diabetes"[Title/Abstract])"#),
    ("diabetes", r#"("diabetes mellitus"[MeSH Terms] OR "diabetes"[Title/Abstract])"#),
    ("heart attack", r#"("myocardial infarction"[MeSH Terms] OR "heart attack"[Title/Abstract])"#),
    ("myocardial infarction", r#"("myocardial infarction"[MeSH Terms] OR "myocardial infarction"[Title/Abstract])"#),
    ("heart failure", r#"("heart failure"[MeSH Terms] OR "heart failure"[Title/Abstract])"#),
    ("high blood pressure", r#"("hypertension"[MeSH Terms] OR "high blood pressure"[Title/Abstract])"#),
    ("hypertension", r#"("hypertension"[MeSH Terms] OR "hypertension"[Title/Abstract])"#),
    ("atrial fibrillation", r#"("atrial fibrillation"[MeSH Terms] OR "atrial fibrillation"[Title/Abstract])"#),
    ("stroke", r#"("stroke"[MeSH Terms] OR "stroke"[Title/Abstract])"#),
    ("cancer", r#"("neoplasms"[MeSH Terms] OR "cancer"[Title/Abstract])"#),
    ("covid-19", r#"("covid-19"[MeSH Terms] OR "sars-cov-2"[Title/Abstract])"#),
    ("covid", r#"("covid-19"[MeSH Terms] OR "sars-cov-2"[Title/Abstract])"#),
    ("kidney disease", r#"("renal insufficiency, chronic"[MeSH Terms] OR "chronic kidney disease"[Title/Abstract])"#),
    ("copd", r#"("pulmonary disease, chronic obstructive"[MeSH Terms] OR "copd"[Title/Abstract])"#),
    ("asthma", r#"("asthma"[MeSH Terms] OR "asthma"[Title/Abstract])"#),
    ("depression", r#"("depressive disorder"[MeSH Terms] OR "depression"[Title/Abstract])"#),
    ("obesity", r#"("obesity"[MeSH Terms] OR "obesity"[Title/Abstract])"#),
    ("sepsis", r#"("sepsis"[MeSH Terms] OR "sepsis"[Title/Abstract])"#),
    ("hba1c", r#"("glycated hemoglobin"[MeSH Terms] OR "hba1c"[Title/Abstract])"#),
    ("metformin", r#"("metformin"[MeSH Terms] OR "metformin"[Title/Abstract])"#),
    ("semaglutide", r#"("semaglutide"[Supplementary Concept] OR "semaglutide"[Title/Abstract])"#),
    ("insulin", r#"("insulin"[MeSH Terms] OR "insulin"[Title/Abstract])"#),
    ("statins", r#"("hydroxymethylglutaryl-coa reductase inhibitors"[MeSH Terms] OR "statin"[Title/Abstract])"#),
    ("statin", r#"("hydroxymethylglutaryl-coa reductase inhibitors"[MeSH Terms] OR "statin"[Title/Abstract])"#),
    ("aspirin", r#"("aspirin"[MeSH Terms] OR "aspirin"[Title/Abstract])"#),
];

/// Terms eligible for the broader fallback search.
const BASIC_TERMS: &[&str] = &[
    "diabetes", "hypertension", "cancer", "asthma", "copd", "stroke", "obesity", "depression",
    "sepsis", "pneumonia", "covid", "heart failure", "myocardial infarction", "atrial fibrillation",
    "kidney disease", "dementia", "metformin", "insulin", "semaglutide", "aspirin", "statin",
    "warfarin", "apixaban", "hba1c", "blood pressure", "cholesterol", "vaccine",
];

const MAX_FALLBACK_TERMS: usize = 3;

const COMPARISON_WORDS: &[&str] = &["compare", "compared", "comparing", "comparison", "vs", "versus"];
const OUTCOME_WORDS: &[&str] = &["survival", "mortality", "outcome", "outcomes", "prognosis"];

const COMPARATIVE_FILTER: &str =
    "(comparative study[pt] OR randomized controlled trial[pt] OR clinical trial[pt])";
const OUTCOME_FILTER: &str = "(cohort studies[MeSH Terms] OR follow-up studies[MeSH Terms] OR prospective studies[MeSH Terms])";
const TRIAL_FILTER: &str = "(randomized controlled trial[pt] OR clinical trial[pt] OR meta-analysis[pt] OR systematic review[pt])";
const POPULATION_FILTER: &str = "humans[MeSH Terms] AND english[lang]";

static TERM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let mut keys: Vec<&str> = TERM_MAP.iter().map(|(key, _)| *key).collect();
    keys.sort_by_key(|key| std::cmp::Reverse(key.len()));
    let alternation = keys
        .iter()
        .map(|key| regex::escape(key))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("valid term pattern")
});

/// Query in the bibliographic service's own syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchExpression(pub String);

impl SearchExpression {
    /// Raw expression text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SearchExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque record handle returned by a search, in relevance order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RecordId(pub String);

impl RecordId {
    /// Raw identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Study-design emphasis inferred from the query wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyFocus {
    /// "compare", "vs", "versus".
    Comparative,
    /// "survival", "mortality", "outcome".
    Outcomes,
    /// Anything else: trials and syntheses.
    Trials,
}

impl StudyFocus {
    fn from_query(query: &str) -> Self {
        let words = padded_words(query);
        let has_any = |list: &[&str]| list.iter().any(|w| words.contains(&format!(" {w} ")));
        if has_any(COMPARISON_WORDS) {
            Self::Comparative
        } else if has_any(OUTCOME_WORDS) {
            Self::Outcomes
        } else {
            Self::Trials
        }
    }

    fn filter(self) -> &'static str {
        match self {
            Self::Comparative => COMPARATIVE_FILTER,
            Self::Outcomes => OUTCOME_FILTER,
            Self::Trials => TRIAL_FILTER,
        }
    }
}

/// Primary search expression plus the focus that shaped it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPlan {
    pub expression: SearchExpression,
    pub focus: StudyFocus,
}

/// Parameters for one search call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub expression: SearchExpression,
    pub max_results: usize,
    /// Publication-date window, in days back from today.
    pub recency_days: u32,
}

/// Result-count and recency bounds for the primary and fallback searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSettings {
    pub max_results: usize,
    pub primary_recency_years: u32,
    pub fallback_recency_years: u32,
    pub timeout: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_results: 10,
            primary_recency_years: 5,
            fallback_recency_years: 10,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Which search produced the identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// The precise, filtered search returned results.
    Primary,
    /// Only the broader fallback search returned results.
    Fallback,
    /// Both searches came back empty.
    #[serde(rename = "none")]
    NoResults,
    /// No search was attempted for this query.
    #[serde(rename = "not_applicable")]
    NotApplicable,
}

impl SearchStrategy {
    /// Label exposed in the response envelope.
    pub fn label(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::NoResults => "none",
            Self::NotApplicable => "not_applicable",
        }
    }
}

/// Identifiers found plus the strategy that found them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    pub ids: Vec<RecordId>,
    pub strategy: SearchStrategy,
}

/// Replaces known domain terms with their query-syntax equivalents.
///
/// Text inside double quotes or square brackets is never rewritten, which
/// makes the function idempotent: running it over its own output changes
/// nothing.
pub fn substitute_terms(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    for (protected, segment) in split_protected(expression) {
        if protected {
            out.push_str(segment);
            continue;
        }
        let replaced = TERM_PATTERN.replace_all(segment, |caps: &Captures| {
            let matched = caps[0].to_lowercase();
            TERM_MAP
                .iter()
                .find(|(key, _)| *key == matched)
                .map(|(_, syntax)| syntax.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        });
        out.push_str(&replaced);
    }
    out
}

/// Splits `text` into `(protected, segment)` runs; quoted and bracketed spans are protected.
fn split_protected(text: &str) -> Vec<(bool, &str)> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut closing: Option<char> = None;
    for (idx, ch) in text.char_indices() {
        match closing {
            None if ch == '"' || ch == '[' => {
                if idx > start {
                    segments.push((false, &text[start..idx]));
                }
                start = idx;
                closing = Some(if ch == '"' { '"' } else { ']' });
            }
            Some(end) if ch == end && idx > start => {
                let next = idx + ch.len_utf8();
                segments.push((true, &text[start..next]));
                start = next;
                closing = None;
            }
            _ => {}
        }
    }
    if start < text.len() {
        segments.push((closing.is_some(), &text[start..]));
    }
    segments
}

/// Drops sentence punctuation and collapses whitespace.
fn clean_query(query: &str) -> String {
    query
        .chars()
        .map(|ch| {
            if matches!(ch, '?' | '!' | ',' | ';' | ':' | '.' | '¿' | '¡') {
                ' '
            } else {
                ch
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds the primary expression: substituted terms, a study-type filter and
/// the human/English population filter.
pub fn plan(query: &str) -> SearchPlan {
    let focus = StudyFocus::from_query(query);
    let core = substitute_terms(&clean_query(query));
    let expression = format!("({core}) AND {} AND {POPULATION_FILTER}", focus.filter());
    SearchPlan {
        expression: SearchExpression(expression),
        focus,
    }
}

/// Builds the broader fallback expression: up to three whitelisted terms in
/// order of appearance, OR-ed together, with only the population filter.
pub fn fallback_expression(query: &str) -> SearchExpression {
    let words = padded_words(query);
    let mut found: Vec<(usize, &str)> = BASIC_TERMS
        .iter()
        .filter_map(|term| {
            words
                .find(&format!(" {term} "))
                .map(|position| (position, *term))
        })
        .collect();
    found.sort_by_key(|(position, _)| *position);
    let terms: Vec<String> = found
        .into_iter()
        .take(MAX_FALLBACK_TERMS)
        .map(|(_, term)| {
            if term.contains(' ') {
                format!("\"{term}\"")
            } else {
                term.to_string()
            }
        })
        .collect();

    let core = if terms.is_empty() {
        clean_query(query)
    } else {
        terms.join(" OR ")
    };
    SearchExpression(format!("({core}) AND {POPULATION_FILTER}"))
}

/// Runs the primary search and, only when it yields nothing, one fallback.
///
/// Service errors and timeouts count as "no identifiers". At most two calls
/// are made.
pub async fn search_with_fallback(
    source: &dyn LiteratureSource,
    query: &str,
    settings: &SearchSettings,
) -> SearchOutcome {
    let primary = SearchRequest {
        expression: plan(query).expression,
        max_results: settings.max_results,
        recency_days: years_to_days(settings.primary_recency_years),
    };
    let ids = run_search(source, &primary, settings.timeout, "primary").await;
    if !ids.is_empty() {
        info!(count = ids.len(), "primary literature search returned results");
        return SearchOutcome {
            ids,
            strategy: SearchStrategy::Primary,
        };
    }

    let fallback = SearchRequest {
        expression: fallback_expression(query),
        max_results: settings.max_results,
        recency_days: years_to_days(settings.fallback_recency_years),
    };
    let ids = run_search(source, &fallback, settings.timeout, "fallback").await;
    if ids.is_empty() {
        info!("no literature found by primary or fallback search");
        return SearchOutcome {
            ids,
            strategy: SearchStrategy::NoResults,
        };
    }
    info!(count = ids.len(), "fallback literature search returned results");
    SearchOutcome {
        ids,
        strategy: SearchStrategy::Fallback,
    }
}

async fn run_search(
    source: &dyn LiteratureSource,
    request: &SearchRequest,
    timeout: Duration,
    stage: &str,
) -> Vec<RecordId> {
    debug!(stage, expression = %request.expression, "issuing literature search");
    match tokio::time::timeout(timeout, source.search(request)).await {
        Ok(Ok(ids)) => ids,
        Ok(Err(err)) => {
            warn!(stage, error = %format!("{err:#}"), "literature search failed");
            Vec::new()
        }
        Err(_) => {
            warn!(stage, timeout_secs = timeout.as_secs_f64(), "literature search timed out");
            Vec::new()
        }
    }
}

fn years_to_days(years: u32) -> u32 {
    years.saturating_mul(365)
}
