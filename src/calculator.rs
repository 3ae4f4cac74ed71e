//! Pure clinical and statistical formulas.
//!
//! Each formula rejects non-physical input with a [`CalculationError`] instead
//! of letting `inf`/`NaN` reach a response.

use std::fmt;

use serde::Serialize;

use crate::statistics::{CalculationInput, CalculationKind, Sex, SexMarker};

const WEIGHT_KG_RANGE: (f64, f64) = (1.0, 500.0);
const HEIGHT_M_RANGE: (f64, f64) = (0.3, 2.5);
const HEIGHT_CM_RANGE: (f64, f64) = (30.0, 250.0);
const BMI_RANGE: (f64, f64) = (5.0, 150.0);

/// Errors raised by the formulas.
#[derive(Debug, Clone, PartialEq)]
pub enum CalculationError {
    /// A parameter that must be strictly positive was zero or negative.
    NonPositive {
        /// Parameter name.
        parameter: &'static str,
        /// Offending value.
        value: f64,
    },
    /// A parameter lies outside the range the formula is defined for.
    OutOfRange {
        /// Parameter name.
        parameter: &'static str,
        /// Offending value.
        value: f64,
    },
    /// A contingency table with an empty row or column.
    DegenerateTable,
    /// The formula produced a non-finite or non-physical result.
    InvalidResult {
        /// Calculation that failed.
        kind: CalculationKind,
        /// Raw result.
        value: f64,
    },
}

impl fmt::Display for CalculationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositive { parameter, value } => {
                write!(f, "{parameter} must be positive (got {value})")
            }
            Self::OutOfRange { parameter, value } => {
                write!(f, "{parameter} is out of range (got {value})")
            }
            Self::DegenerateTable => write!(f, "contingency table has an empty row or column"),
            Self::InvalidResult { kind, value } => {
                write!(f, "{kind} produced an invalid result ({value})")
            }
        }
    }
}

impl std::error::Error for CalculationError {}

/// A named input value echoed back with the result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedValue {
    pub name: &'static str,
    pub value: f64,
}

/// Output of a successful calculation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub kind: CalculationKind,
    pub value: f64,
    pub unit: String,
    /// Inputs as used by the formula (after unit normalisation).
    pub inputs: Vec<NamedValue>,
    /// Assumptions the caller should know about (unit guesses, default sex).
    pub assumptions: Vec<String>,
}

impl CalculationResult {
    /// One-line rendering, e.g. `Body Mass Index: 22.86 kg/m²`.
    pub fn summary(&self) -> String {
        format!("{}: {:.2} {}", self.kind.label(), self.value, self.unit)
    }
}

/// Body-mass index in kg/m².
pub fn bmi(weight_kg: f64, height_m: f64) -> Result<f64, CalculationError> {
    positive("weight", weight_kg)?;
    positive("height", height_m)?;
    within("weight", weight_kg, WEIGHT_KG_RANGE)?;
    within("height", height_m, HEIGHT_M_RANGE)?;
    let value = finite(CalculationKind::Bmi, weight_kg / (height_m * height_m))?;
    if value < BMI_RANGE.0 || value > BMI_RANGE.1 {
        return Err(CalculationError::InvalidResult {
            kind: CalculationKind::Bmi,
            value,
        });
    }
    Ok(value)
}

/// Mosteller body-surface area in m².
pub fn bsa_mosteller(weight_kg: f64, height_cm: f64) -> Result<f64, CalculationError> {
    positive("weight", weight_kg)?;
    positive("height", height_cm)?;
    within("weight", weight_kg, WEIGHT_KG_RANGE)?;
    within("height", height_cm, HEIGHT_CM_RANGE)?;
    finite(CalculationKind::Bsa, (height_cm * weight_kg / 3600.0).sqrt())
}

/// Cockcroft-Gault creatinine clearance in mL/min.
pub fn creatinine_clearance(
    age_years: f64,
    weight_kg: f64,
    serum_creatinine_mg_dl: f64,
    sex: Sex,
) -> Result<f64, CalculationError> {
    positive("age", age_years)?;
    if age_years >= 140.0 {
        return Err(CalculationError::OutOfRange {
            parameter: "age",
            value: age_years,
        });
    }
    positive("weight", weight_kg)?;
    within("weight", weight_kg, WEIGHT_KG_RANGE)?;
    positive("serum_creatinine", serum_creatinine_mg_dl)?;
    let base = (140.0 - age_years) * weight_kg / (72.0 * serum_creatinine_mg_dl);
    let factor = match sex {
        Sex::Male => 1.0,
        Sex::Female => 0.85,
    };
    finite(CalculationKind::CreatinineClearance, base * factor)
}

/// Pearson chi-square statistic (df = 1) for the table `[[a, b], [c, d]]`.
pub fn chi_square_2x2(a: f64, b: f64, c: f64, d: f64) -> Result<f64, CalculationError> {
    for (parameter, value) in [("a", a), ("b", b), ("c", c), ("d", d)] {
        if !value.is_finite() || value < 0.0 {
            return Err(CalculationError::OutOfRange { parameter, value });
        }
    }
    let marginals = [(a + b), (c + d), (a + c), (b + d)];
    if marginals.iter().any(|m| *m == 0.0) {
        return Err(CalculationError::DegenerateTable);
    }
    let n = a + b + c + d;
    let numerator = n * (a * d - b * c).powi(2);
    let denominator: f64 = marginals.iter().product();
    finite(CalculationKind::ChiSquare, numerator / denominator)
}

/// Deurenberg adult body-fat percentage from weight, height and age.
pub fn body_fat_deurenberg(
    weight_kg: f64,
    height_m: f64,
    age_years: f64,
    sex: Sex,
) -> Result<f64, CalculationError> {
    let index = bmi(weight_kg, height_m)?;
    positive("age", age_years)?;
    let sex_term = match sex {
        Sex::Male => 1.0,
        Sex::Female => 0.0,
    };
    let value = 1.20 * index + 0.23 * age_years - 10.8 * sex_term - 5.4;
    physical(CalculationKind::BodyFat, value)
}

/// Devine ideal body weight in kg.
pub fn ideal_body_weight_devine(height_cm: f64, sex: Sex) -> Result<f64, CalculationError> {
    positive("height", height_cm)?;
    within("height", height_cm, HEIGHT_CM_RANGE)?;
    let inches = height_cm / 2.54;
    let base = match sex {
        Sex::Male => 50.0,
        Sex::Female => 45.5,
    };
    physical(CalculationKind::IdealBodyWeight, base + 2.3 * (inches - 60.0))
}

/// Runs the formula for `input`, normalising obvious unit slips first.
///
/// Heights above 3 where metres are expected are read as centimetres, and
/// heights below 3 where centimetres are expected are read as metres. Both
/// conversions and a defaulted sex are listed in
/// [`CalculationResult::assumptions`].
pub fn calculate(input: &CalculationInput) -> Result<CalculationResult, CalculationError> {
    let mut assumptions = Vec::new();
    let kind = input.kind();
    let (value, unit, inputs) = match *input {
        CalculationInput::Bmi {
            weight_kg,
            height_m,
        } => {
            let height_m = as_metres(height_m, &mut assumptions);
            (
                bmi(weight_kg, height_m)?,
                "kg/m²",
                vec![named("weight_kg", weight_kg), named("height_m", height_m)],
            )
        }
        CalculationInput::Bsa {
            weight_kg,
            height_cm,
        } => {
            let height_cm = as_centimetres(height_cm, &mut assumptions);
            (
                bsa_mosteller(weight_kg, height_cm)?,
                "m²",
                vec![named("weight_kg", weight_kg), named("height_cm", height_cm)],
            )
        }
        CalculationInput::CreatinineClearance {
            age_years,
            weight_kg,
            serum_creatinine_mg_dl,
            sex,
        } => {
            note_sex(sex, &mut assumptions);
            (
                creatinine_clearance(age_years, weight_kg, serum_creatinine_mg_dl, sex.sex)?,
                "mL/min",
                vec![
                    named("age_years", age_years),
                    named("weight_kg", weight_kg),
                    named("serum_creatinine_mg_dl", serum_creatinine_mg_dl),
                ],
            )
        }
        CalculationInput::ChiSquare { a, b, c, d } => (
            chi_square_2x2(a, b, c, d)?,
            "χ² (df = 1)",
            vec![named("a", a), named("b", b), named("c", c), named("d", d)],
        ),
        CalculationInput::BodyFat {
            weight_kg,
            height_m,
            age_years,
            sex,
        } => {
            let height_m = as_metres(height_m, &mut assumptions);
            note_sex(sex, &mut assumptions);
            (
                body_fat_deurenberg(weight_kg, height_m, age_years, sex.sex)?,
                "%",
                vec![
                    named("weight_kg", weight_kg),
                    named("height_m", height_m),
                    named("age_years", age_years),
                ],
            )
        }
        CalculationInput::IdealBodyWeight { height_cm, sex } => {
            let height_cm = as_centimetres(height_cm, &mut assumptions);
            note_sex(sex, &mut assumptions);
            (
                ideal_body_weight_devine(height_cm, sex.sex)?,
                "kg",
                vec![named("height_cm", height_cm)],
            )
        }
    };
    Ok(CalculationResult {
        kind,
        value,
        unit: unit.to_string(),
        inputs,
        assumptions,
    })
}

fn named(name: &'static str, value: f64) -> NamedValue {
    NamedValue { name, value }
}

fn as_metres(height: f64, assumptions: &mut Vec<String>) -> f64 {
    if height > 3.0 {
        assumptions.push(format!("height {height} read as centimetres"));
        height / 100.0
    } else {
        height
    }
}

fn as_centimetres(height: f64, assumptions: &mut Vec<String>) -> f64 {
    if height > 0.0 && height < 3.0 {
        assumptions.push(format!("height {height} read as metres"));
        height * 100.0
    } else {
        height
    }
}

fn note_sex(sex: SexMarker, assumptions: &mut Vec<String>) {
    if !sex.stated {
        assumptions.push("sex not stated; male formula applied".to_string());
    }
}

fn positive(parameter: &'static str, value: f64) -> Result<(), CalculationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CalculationError::NonPositive { parameter, value })
    }
}

fn within(
    parameter: &'static str,
    value: f64,
    (min, max): (f64, f64),
) -> Result<(), CalculationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(CalculationError::OutOfRange { parameter, value })
    }
}

fn finite(kind: CalculationKind, value: f64) -> Result<f64, CalculationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CalculationError::InvalidResult { kind, value })
    }
}

fn physical(kind: CalculationKind, value: f64) -> Result<f64, CalculationError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(CalculationError::InvalidResult { kind, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 0.01,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn bmi_is_deterministic() {
        let first = bmi(70.0, 1.75).expect("valid bmi");
        approx(first, 22.857);
        for _ in 0..10 {
            assert_eq!(bmi(70.0, 1.75).expect("valid bmi"), first);
        }
    }

    #[test]
    fn zero_height_is_an_error_not_infinity() {
        assert_eq!(
            bmi(70.0, 0.0),
            Err(CalculationError::NonPositive {
                parameter: "height",
                value: 0.0
            })
        );
        assert!(bsa_mosteller(-1.0, 170.0).is_err());
        assert!(bmi(f64::NAN, 1.7).is_err());
    }

    #[test]
    fn reference_values() {
        approx(bsa_mosteller(70.0, 175.0).expect("bsa"), 1.8447);
        approx(
            creatinine_clearance(60.0, 72.0, 1.0, Sex::Male).expect("crcl"),
            80.0,
        );
        approx(
            creatinine_clearance(60.0, 72.0, 1.0, Sex::Female).expect("crcl"),
            68.0,
        );
        approx(chi_square_2x2(10.0, 20.0, 30.0, 40.0).expect("chi"), 0.7937);
        approx(ideal_body_weight_devine(180.0, Sex::Male).expect("ibw"), 75.0);
        approx(
            body_fat_deurenberg(64.0, 1.6, 40.0, Sex::Female).expect("bf"),
            33.8,
        );
    }

    #[test]
    fn non_physical_inputs_fail() {
        assert_eq!(
            creatinine_clearance(150.0, 70.0, 1.0, Sex::Male),
            Err(CalculationError::OutOfRange {
                parameter: "age",
                value: 150.0
            })
        );
        assert!(creatinine_clearance(50.0, 70.0, 0.0, Sex::Male).is_err());
        assert_eq!(
            chi_square_2x2(0.0, 0.0, 5.0, 5.0),
            Err(CalculationError::DegenerateTable)
        );
        assert!(chi_square_2x2(-1.0, 2.0, 3.0, 4.0).is_err());
        assert!(ideal_body_weight_devine(50.0, Sex::Female).is_err());
    }

    #[test]
    fn implausible_body_measurements_fail() {
        // "BMI over 30 and HbA1c above 7": 7 is read as 7 cm
        assert_eq!(
            calculate(&CalculationInput::Bmi {
                weight_kg: 30.0,
                height_m: 7.0,
            }),
            Err(CalculationError::OutOfRange {
                parameter: "height",
                value: 0.07
            })
        );
        assert_eq!(
            bmi(700.0, 1.8),
            Err(CalculationError::OutOfRange {
                parameter: "weight",
                value: 700.0
            })
        );
        assert!(matches!(
            bmi(300.0, 1.2),
            Err(CalculationError::InvalidResult { .. })
        ));
        assert!(bsa_mosteller(70.0, 400.0).is_err());
        assert!(ideal_body_weight_devine(20.0, Sex::Male).is_err());
        assert!(body_fat_deurenberg(30.0, 0.2, 40.0, Sex::Male).is_err());
        assert!(creatinine_clearance(60.0, 0.5, 1.0, Sex::Male).is_err());
    }

    #[test]
    fn calculate_reports_unit_guesses_and_default_sex() {
        let result = calculate(&CalculationInput::Bmi {
            weight_kg: 70.0,
            height_m: 175.0,
        })
        .expect("bmi from centimetres");
        approx(result.value, 22.857);
        assert_eq!(result.unit, "kg/m²");
        assert_eq!(result.assumptions, vec!["height 175 read as centimetres"]);

        let result = calculate(&CalculationInput::IdealBodyWeight {
            height_cm: 1.8,
            sex: SexMarker {
                sex: Sex::Male,
                stated: false,
            },
        })
        .expect("ibw from metres");
        approx(result.value, 75.0);
        assert_eq!(result.assumptions.len(), 2);
        assert!(result.assumptions[1].contains("male formula"));
    }

    #[test]
    fn summary_formats_two_decimals() {
        let result = calculate(&CalculationInput::Bmi {
            weight_kg: 70.0,
            height_m: 1.75,
        })
        .expect("bmi");
        assert_eq!(result.summary(), "Body Mass Index: 22.86 kg/m²");
        assert_eq!(result.kind.as_str(), "bmi");
    }
}
