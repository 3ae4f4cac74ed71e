//! Detection of embedded calculation requests ("what is the BMI of a 70 kg ...").
//!
//! Detection is a partial function: a recognised calculation with too few
//! numbers yields `parameters: None`, never an error and never invented values.
//!
//! Sex-dependent formulas read the sex from keywords (`female`, `woman`,
//! `she`, ...). When no such keyword is present the male branch is used and
//! [`SexMarker::stated`] is `false`; the calculator reports that assumption to
//! the caller instead of guessing further.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::classifier::padded_words;

/// Supported calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationKind {
    /// Body-mass index.
    Bmi,
    /// Body-surface area (Mosteller).
    Bsa,
    /// Creatinine clearance (Cockcroft-Gault).
    CreatinineClearance,
    /// Pearson chi-square for a 2x2 table.
    ChiSquare,
    /// Body-fat percentage (Deurenberg).
    BodyFat,
    /// Ideal body weight (Devine).
    IdealBodyWeight,
}

impl CalculationKind {
    /// Stable identifier used in responses (`"bmi"`, `"creatinine_clearance"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bmi => "bmi",
            Self::Bsa => "bsa",
            Self::CreatinineClearance => "creatinine_clearance",
            Self::ChiSquare => "chi_square",
            Self::BodyFat => "body_fat",
            Self::IdealBodyWeight => "ideal_body_weight",
        }
    }

    /// Human-readable label used in prompts.
    pub fn label(self) -> &'static str {
        match self {
            Self::Bmi => "Body Mass Index",
            Self::Bsa => "Body Surface Area (Mosteller)",
            Self::CreatinineClearance => "Creatinine Clearance (Cockcroft-Gault)",
            Self::ChiSquare => "Chi-square test (2x2)",
            Self::BodyFat => "Body Fat Percentage (Deurenberg)",
            Self::IdealBodyWeight => "Ideal Body Weight (Devine)",
        }
    }

    /// Number of numeric slots the detector must fill.
    pub fn required_numbers(self) -> usize {
        match self {
            Self::Bmi | Self::Bsa => 2,
            Self::CreatinineClearance | Self::BodyFat => 3,
            Self::ChiSquare => 4,
            Self::IdealBodyWeight => 1,
        }
    }
}

impl fmt::Display for CalculationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Biological sex as used by sex-specific formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
}

/// Sex read from the query plus whether the query actually said so.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SexMarker {
    pub sex: Sex,
    pub stated: bool,
}

/// Fully populated parameters for one calculation, in slot order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalculationInput {
    Bmi {
        weight_kg: f64,
        height_m: f64,
    },
    Bsa {
        weight_kg: f64,
        height_cm: f64,
    },
    CreatinineClearance {
        age_years: f64,
        weight_kg: f64,
        serum_creatinine_mg_dl: f64,
        sex: SexMarker,
    },
    ChiSquare {
        a: f64,
        b: f64,
        c: f64,
        d: f64,
    },
    BodyFat {
        weight_kg: f64,
        height_m: f64,
        age_years: f64,
        sex: SexMarker,
    },
    IdealBodyWeight {
        height_cm: f64,
        sex: SexMarker,
    },
}

impl CalculationInput {
    /// Calculation this input belongs to.
    pub fn kind(&self) -> CalculationKind {
        match self {
            Self::Bmi { .. } => CalculationKind::Bmi,
            Self::Bsa { .. } => CalculationKind::Bsa,
            Self::CreatinineClearance { .. } => CalculationKind::CreatinineClearance,
            Self::ChiSquare { .. } => CalculationKind::ChiSquare,
            Self::BodyFat { .. } => CalculationKind::BodyFat,
            Self::IdealBodyWeight { .. } => CalculationKind::IdealBodyWeight,
        }
    }

    /// Named numeric parameters in slot order.
    pub fn parameters(&self) -> Vec<(&'static str, f64)> {
        match *self {
            Self::Bmi {
                weight_kg,
                height_m,
            } => vec![("weight", weight_kg), ("height", height_m)],
            Self::Bsa {
                weight_kg,
                height_cm,
            } => vec![("weight", weight_kg), ("height", height_cm)],
            Self::CreatinineClearance {
                age_years,
                weight_kg,
                serum_creatinine_mg_dl,
                ..
            } => vec![
                ("age", age_years),
                ("weight", weight_kg),
                ("serum_creatinine", serum_creatinine_mg_dl),
            ],
            Self::ChiSquare { a, b, c, d } => vec![("a", a), ("b", b), ("c", c), ("d", d)],
            Self::BodyFat {
                weight_kg,
                height_m,
                age_years,
                ..
            } => vec![
                ("weight", weight_kg),
                ("height", height_m),
                ("age", age_years),
            ],
            Self::IdealBodyWeight { height_cm, .. } => vec![("height", height_cm)],
        }
    }
}

/// Outcome of scanning a query for a calculation request.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticalIntent {
    pub recognized: bool,
    pub kind: Option<CalculationKind>,
    /// `None` when the kind is unknown or the query lacks enough numbers.
    pub parameters: Option<CalculationInput>,
}

impl StatisticalIntent {
    fn none() -> Self {
        Self {
            recognized: false,
            kind: None,
            parameters: None,
        }
    }
}

fn recognizer(source: &str) -> Regex {
    Regex::new(source).unwrap_or_else(|err| panic!("invalid recognizer {source:?}: {err}"))
}

// Order matters: narrower calculations first, BMI (with its weight/height
// co-occurrence rule) last.
static RECOGNIZERS: LazyLock<Vec<(CalculationKind, Regex)>> = LazyLock::new(|| {
    vec![
        (
            CalculationKind::CreatinineClearance,
            recognizer(r"(?i)\b(creatinine\s+clearance|crcl|cockcroft(?:[-\s]+gault)?)\b"),
        ),
        (
            CalculationKind::Bsa,
            recognizer(r"(?i)\b(bsa|body\s+surface\s+area|mosteller)\b"),
        ),
        (
            CalculationKind::BodyFat,
            recognizer(r"(?i)\b(body[-\s]*fat|bfp|fat\s+percentage)\b"),
        ),
        (
            CalculationKind::IdealBodyWeight,
            recognizer(r"(?i)\b(ideal\s+body\s+weight|ideal\s+weight|ibw|devine)\b"),
        ),
        (
            CalculationKind::ChiSquare,
            recognizer(r"(?i)(\bchi[-\s]?squared?\b|\bchi2\b|χ2|χ²)"),
        ),
        (
            CalculationKind::Bmi,
            recognizer(
                r"(?i)\b(bmi|body\s+mass\s+index)\b|\bweigh\w*\b.*\b(height|tall)\b|\b(height|tall)\b.*\bweigh\w*\b",
            ),
        ),
    ]
});

static NUMBER: LazyLock<Regex> = LazyLock::new(|| recognizer(r"\d+(?:\.\d+)?"));

/// A comparison immediately before a number: `BMI over 30`, `HbA1c >= 7`.
static THRESHOLD: LazyLock<Regex> = LazyLock::new(|| {
    recognizer(
        r"(?i)(?:\b(?:over|above|under|below|exceed(?:s|ing)?|beyond|(?:greater|more|less|fewer)\s+than|at\s+(?:least|most)|up\s+to)|[<>≤≥]=?)\s*$",
    )
});

const FEMALE_WORDS: &[&str] = &["female", "woman", "women", "she", "her", "girl", "lady"];
const MALE_WORDS: &[&str] = &["male", "man", "men", "he", "his", "him", "boy", "gentleman"];

/// Scans `text` for at most one calculation request.
pub fn detect(text: &str) -> StatisticalIntent {
    let Some(kind) = RECOGNIZERS
        .iter()
        .find(|(_, pattern)| pattern.is_match(text))
        .map(|(kind, _)| *kind)
    else {
        return StatisticalIntent::none();
    };

    let numbers = extract_numbers(text);
    let parameters = (numbers.len() >= kind.required_numbers())
        .then(|| build_input(kind, &numbers, sex_marker(text)));
    StatisticalIntent {
        recognized: true,
        kind: Some(kind),
        parameters,
    }
}

fn build_input(kind: CalculationKind, n: &[f64], sex: SexMarker) -> CalculationInput {
    match kind {
        CalculationKind::Bmi => CalculationInput::Bmi {
            weight_kg: n[0],
            height_m: n[1],
        },
        CalculationKind::Bsa => CalculationInput::Bsa {
            weight_kg: n[0],
            height_cm: n[1],
        },
        CalculationKind::CreatinineClearance => CalculationInput::CreatinineClearance {
            age_years: n[0],
            weight_kg: n[1],
            serum_creatinine_mg_dl: n[2],
            sex,
        },
        CalculationKind::ChiSquare => CalculationInput::ChiSquare {
            a: n[0],
            b: n[1],
            c: n[2],
            d: n[3],
        },
        CalculationKind::BodyFat => CalculationInput::BodyFat {
            weight_kg: n[0],
            height_m: n[1],
            age_years: n[2],
            sex,
        },
        CalculationKind::IdealBodyWeight => CalculationInput::IdealBodyWeight {
            height_cm: n[0],
            sex,
        },
    }
}

/// Integers and decimals in order of appearance. Digits glued to a preceding
/// letter (`HbA1c`, `T2DM`) are part of a name, not a value, and numbers after
/// a comparison (`over 30`, `> 7`) are eligibility thresholds.
pub fn extract_numbers(text: &str) -> Vec<f64> {
    NUMBER
        .find_iter(text)
        .filter(|m| {
            let before = &text[..m.start()];
            !before
                .chars()
                .next_back()
                .is_some_and(|ch| ch.is_alphabetic())
                && !THRESHOLD.is_match(before)
        })
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

/// Female when a female keyword is present, otherwise male.
pub fn sex_marker(text: &str) -> SexMarker {
    let words = padded_words(text);
    let has_any = |list: &[&str]| list.iter().any(|w| words.contains(&format!(" {w} ")));
    if has_any(FEMALE_WORDS) {
        SexMarker {
            sex: Sex::Female,
            stated: true,
        }
    } else {
        SexMarker {
            sex: Sex::Male,
            stated: has_any(MALE_WORDS),
        }
    }
}
