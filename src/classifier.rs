//! Rule-table query classification (identity / clinical / general).
//!
//! Rules are evaluated in order; the first rule that matches decides the
//! category. Exact identity phrases come before clinical keyword rules, so a
//! clinical sentence that merely contains "you" is never routed to a canned
//! identity answer.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Platform name used by the default identity phrases and canned answers.
pub const DEFAULT_PLATFORM_NAME: &str = "CareNexus";

/// Category assigned to an incoming query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Questions about the assistant or platform itself.
    Identity,
    /// Medical-content questions that warrant literature retrieval.
    Clinical,
    /// Everything else.
    General,
}

/// Sub-intent inside the identity bucket, used to pick a canned response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityIntent {
    /// "who made you" and friends.
    Creator,
    /// "what is <platform>".
    Platform,
    /// Any other identity phrase.
    Generic,
}

/// Keyword tables backing the classifier.
///
/// Loaded from JSON when an operator wants to extend the lists; otherwise
/// [`ClassifierRules::default`] applies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClassifierRules {
    /// Whole-query phrases that identify questions about the assistant.
    pub identity_phrases: Vec<String>,
    /// Clinical vocabulary; any whole-word hit makes a query clinical.
    pub clinical_terms: Vec<String>,
}

const CREATOR_WORDS: &[&str] = &[
    "made", "created", "create", "built", "developed", "designed", "owns", "creator", "creo",
    "creó", "créé",
];

const BASE_IDENTITY_PHRASES: &[&str] = &[
    "who are you",
    "who made you",
    "who created you",
    "who built you",
    "who developed you",
    "who designed you",
    "who owns you",
    "who is your creator",
    "what are you",
    "what is your name",
    "what's your name",
    "introduce yourself",
    "are you an ai",
    "are you a bot",
    "quien eres",
    "quién eres",
    "quien te creo",
    "quién te creó",
    "qui es-tu",
    "qui es tu",
    "qui t'a créé",
];

const CLINICAL_TERMS: &[&str] = &[
    // comparison vocabulary
    "vs", "versus", "compare", "compared", "comparison",
    // trial and statistics vocabulary
    "trial", "rct", "randomized", "meta-analysis", "systematic review", "cohort", "efficacy",
    "mortality", "survival", "outcome", "outcomes", "p value", "odds ratio", "hazard ratio",
    "confidence interval", "relative risk", "nnt", "chi-square", "chi square",
    // clinical practice
    "dose", "dosage", "side effects", "adverse", "contraindication", "contraindications",
    "treatment", "therapy", "diagnosis", "symptoms", "prognosis", "guideline", "guidelines",
    "patient", "patients", "clinical", "prescribe", "prescription",
    // measurements
    "hba1c", "bmi", "body mass index", "body surface area", "bsa", "creatinine", "egfr",
    "blood pressure", "cholesterol", "ldl", "body fat", "ideal body weight",
    // conditions
    "diabetes", "hypertension", "cancer", "tumor", "asthma", "copd", "stroke", "heart failure",
    "myocardial infarction", "heart attack", "atrial fibrillation", "covid", "covid-19", "sepsis",
    "pneumonia", "depression", "anxiety", "obesity", "kidney disease", "ckd", "hepatitis", "hiv",
    "tuberculosis", "migraine", "epilepsy", "dementia", "alzheimer", "parkinson", "arthritis",
    "osteoporosis", "anemia", "infection",
    // drugs
    "metformin", "insulin", "semaglutide", "liraglutide", "tirzepatide", "empagliflozin",
    "dapagliflozin", "aspirin", "statin", "statins", "atorvastatin", "rosuvastatin", "warfarin",
    "apixaban", "rivaroxaban", "heparin", "lisinopril", "losartan", "amlodipine", "ibuprofen",
    "paracetamol", "acetaminophen", "amoxicillin", "azithromycin", "prednisone", "methotrexate",
    "levothyroxine", "omeprazole", "sertraline", "vaccine",
];

impl ClassifierRules {
    /// Default tables with identity phrases for the given platform name.
    pub fn for_platform(platform_name: &str) -> Self {
        let platform = platform_name.trim().to_lowercase();
        let mut identity_phrases: Vec<String> =
            BASE_IDENTITY_PHRASES.iter().map(|p| p.to_string()).collect();
        identity_phrases.extend([
            format!("what is {platform}"),
            format!("what is {platform} ai"),
            format!("what's {platform}"),
            format!("tell me about {platform}"),
            format!("are you {platform}"),
            format!("qué es {platform}"),
            format!("que es {platform}"),
        ]);
        Self {
            identity_phrases,
            clinical_terms: CLINICAL_TERMS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Loads rules from a JSON file with `identity_phrases` and `clinical_terms` arrays.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read classifier rules {}", path.display()))?;
        let rules: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid classifier rules in {}", path.display()))?;
        anyhow::ensure!(
            !rules.identity_phrases.is_empty() || !rules.clinical_terms.is_empty(),
            "classifier rules in {} are empty",
            path.display()
        );
        Ok(rules)
    }
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self::for_platform(DEFAULT_PLATFORM_NAME)
    }
}

/// Predicate evaluated against a query.
#[derive(Debug, Clone)]
pub enum Rule {
    /// The whole normalized query equals one of the phrases.
    ExactPhrase(Vec<String>),
    /// Any of the terms occurs as a whole word or phrase.
    AnyTerm(Vec<String>),
}

impl Rule {
    fn matches(&self, phrase: &str, words: &str) -> bool {
        match self {
            Self::ExactPhrase(phrases) => phrases.iter().any(|p| p == phrase),
            Self::AnyTerm(terms) => terms.iter().any(|term| words.contains(term.as_str())),
        }
    }
}

/// Ordered `(Rule, Classification)` pairs with a fallback category.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<(Rule, Classification)>,
    fallback: Classification,
}

impl RuleTable {
    /// Builds the standard table: exact identity phrases, then clinical terms,
    /// then [`Classification::General`].
    pub fn from_rules(rules: &ClassifierRules) -> Self {
        let phrases = rules
            .identity_phrases
            .iter()
            .map(|p| normalize_phrase(p))
            .filter(|p| !p.is_empty())
            .collect();
        let terms = rules
            .clinical_terms
            .iter()
            .map(|t| padded_words(t))
            .filter(|t| !t.trim().is_empty())
            .collect();
        Self {
            rules: vec![
                (Rule::ExactPhrase(phrases), Classification::Identity),
                (Rule::AnyTerm(terms), Classification::Clinical),
            ],
            fallback: Classification::General,
        }
    }

    /// Returns the first matching category, or the fallback.
    pub fn classify(&self, text: &str) -> Classification {
        let phrase = normalize_phrase(text);
        if phrase.is_empty() {
            return self.fallback;
        }
        let words = padded_words(text);
        self.rules
            .iter()
            .find(|(rule, _)| rule.matches(&phrase, &words))
            .map(|(_, category)| *category)
            .unwrap_or(self.fallback)
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::from_rules(&ClassifierRules::default())
    }
}

/// Picks the canned-answer flavour for a query already classified as identity.
pub fn identity_intent(text: &str, platform_name: &str) -> IdentityIntent {
    let words = padded_words(text);
    let has_word = |word: &str| words.contains(&format!(" {word} "));
    if CREATOR_WORDS.iter().any(|word| has_word(word)) {
        return IdentityIntent::Creator;
    }
    let platform = padded_words(platform_name);
    if !platform.trim().is_empty() && words.contains(platform.as_str()) {
        return IdentityIntent::Platform;
    }
    IdentityIntent::Generic
}

/// Lowercases, trims surrounding punctuation and collapses inner whitespace.
pub(crate) fn normalize_phrase(text: &str) -> String {
    let lowered = text.to_lowercase();
    let trimmed = lowered.trim_matches(|ch: char| {
        ch.is_whitespace() || matches!(ch, '?' | '!' | '.' | ',' | ';' | ':' | '¿' | '¡')
    });
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased alphanumeric words joined by single spaces, padded with a space
/// on each side so `contains(" term ")` is a whole-word test.
pub(crate) fn padded_words(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
        .collect();
    let joined = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    format!(" {joined} ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RuleTable {
        RuleTable::default()
    }

    #[test]
    fn exact_identity_phrases_ignore_case_whitespace_and_punctuation() {
        let table = table();
        for input in [
            "who made you",
            "  WHO MADE YOU  ",
            "Who created you?",
            "\twho   are you\n",
            "What is CareNexus?",
            "¿Quién eres?",
            "qui es-tu",
        ] {
            assert_eq!(table.classify(input), Classification::Identity, "{input:?}");
        }
    }

    #[test]
    fn identity_words_inside_longer_sentences_are_not_identity() {
        let table = table();
        assert_eq!(
            table.classify("can you tell me who made you choose metformin over insulin"),
            Classification::Clinical
        );
        assert_eq!(
            table.classify("who are you going to call about the weather"),
            Classification::General
        );
    }

    #[test]
    fn clinical_terms_match_whole_words_only() {
        let table = table();
        assert_eq!(
            table.classify("compare metformin vs semaglutide for HbA1c reduction in type 2 diabetes"),
            Classification::Clinical
        );
        assert_eq!(table.classify("Is a meta-analysis reliable?"), Classification::Clinical);
        // "trial" inside "industrial"
        assert_eq!(
            table.classify("industrial canvas prices"),
            Classification::General
        );
    }

    #[test]
    fn empty_and_general_queries() {
        let table = table();
        assert_eq!(table.classify(""), Classification::General);
        assert_eq!(table.classify("   \n\t "), Classification::General);
        assert_eq!(table.classify("?!"), Classification::General);
        assert_eq!(
            table.classify("what's a good book for a long flight"),
            Classification::General
        );
    }

    #[test]
    fn custom_rules_extend_the_vocabulary() {
        let mut rules = ClassifierRules::default();
        assert_eq!(
            RuleTable::from_rules(&rules).classify("ozempic shortages"),
            Classification::General
        );
        rules.clinical_terms.push("Ozempic".to_string());
        assert_eq!(
            RuleTable::from_rules(&rules).classify("ozempic shortages"),
            Classification::Clinical
        );
    }

    #[test]
    fn rules_deserialize_from_json() {
        let rules: ClassifierRules = serde_json::from_str(
            r#"{"identity_phrases": ["who runs you"], "clinical_terms": ["gout"]}"#,
        )
        .expect("valid rules");
        let table = RuleTable::from_rules(&rules);
        assert_eq!(table.classify("Who runs you?"), Classification::Identity);
        assert_eq!(table.classify("gout flare"), Classification::Clinical);
        assert_eq!(table.classify("who are you"), Classification::General);
    }

    #[test]
    fn identity_sub_intents() {
        assert_eq!(
            identity_intent("who created you", DEFAULT_PLATFORM_NAME),
            IdentityIntent::Creator
        );
        assert_eq!(
            identity_intent("what is carenexus", DEFAULT_PLATFORM_NAME),
            IdentityIntent::Platform
        );
        assert_eq!(
            identity_intent("who are you", DEFAULT_PLATFORM_NAME),
            IdentityIntent::Generic
        );
    }
}
