//! Prompt composition: canned identity answers and the clinical answer template.

use crate::calculator::CalculationResult;
use crate::classifier::{identity_intent, Classification, IdentityIntent, DEFAULT_PLATFORM_NAME};
use crate::evidence::EvidenceBundle;
use crate::pipeline::Query;

/// Names used in canned answers and attribution lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformIdentity {
    pub assistant_name: String,
    pub platform_name: String,
    pub creator: String,
}

impl Default for PlatformIdentity {
    fn default() -> Self {
        Self {
            assistant_name: format!("{DEFAULT_PLATFORM_NAME} AI"),
            platform_name: DEFAULT_PLATFORM_NAME.to_string(),
            creator: format!("the {DEFAULT_PLATFORM_NAME} team"),
        }
    }
}

impl PlatformIdentity {
    /// Phrase every creator answer carries, e.g. `created by the CareNexus team`.
    pub fn creator_attribution(&self) -> String {
        format!("created by {}", self.creator)
    }

    fn footer(&self) -> String {
        format!(
            "{} | {} clinical assistant, {}.",
            self.assistant_name,
            self.platform_name,
            self.creator_attribution()
        )
    }

    fn closing_line(&self) -> String {
        format!(
            "Answer prepared by {}, {}.",
            self.assistant_name,
            self.creator_attribution()
        )
    }
}

/// Either a finished answer or instructions for the language model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposedPrompt {
    /// Returned to the caller verbatim; no model call.
    Canned(String),
    /// Sent to the language model.
    Model(String),
}

impl ComposedPrompt {
    pub fn text(&self) -> &str {
        match self {
            Self::Canned(text) | Self::Model(text) => text,
        }
    }
}

const ANSWER_SECTIONS: &[(&str, &str)] = &[
    (
        "Clinical Assessment",
        "Direct answer to the question in two to four sentences.",
    ),
    (
        "Key Findings",
        "The most relevant results, with numbers where available.",
    ),
    (
        "Evidence Quality",
        "Grade the strength of the evidence (high, moderate, low) and say why.",
    ),
    (
        "Recommendations",
        "Practical, guideline-aligned recommendations for clinicians.",
    ),
    (
        "Statistical Analysis",
        "Interpret effect sizes, confidence intervals and any calculation provided.",
    ),
    (
        "Cost-Effective Alternatives",
        "Cheaper or more widely available options when they exist.",
    ),
    (
        "References",
        "List the sources used for this answer.",
    ),
    (
        "Disclaimer",
        "Remind the reader this supports, and does not replace, clinical judgement.",
    ),
];

/// Builds prompts and canned answers for one platform identity.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    identity: PlatformIdentity,
}

impl Composer {
    pub fn new(identity: PlatformIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &PlatformIdentity {
        &self.identity
    }

    /// Composes the answer or model prompt for a classified query.
    ///
    /// Identity queries ignore `evidence` and `calculation`. General queries
    /// get the clinical template without the evidence block.
    pub fn compose(
        &self,
        classification: Classification,
        query: &Query,
        evidence: &EvidenceBundle,
        calculation: Option<&CalculationResult>,
    ) -> ComposedPrompt {
        match classification {
            Classification::Identity => ComposedPrompt::Canned(self.canned_identity(&query.message)),
            Classification::Clinical => {
                ComposedPrompt::Model(self.model_prompt(query, Some(evidence), calculation))
            }
            Classification::General => {
                ComposedPrompt::Model(self.model_prompt(query, None, calculation))
            }
        }
    }

    fn canned_identity(&self, message: &str) -> String {
        let id = &self.identity;
        let body = match identity_intent(message, &id.platform_name) {
            IdentityIntent::Creator => format!(
                "I'm {}, {} to help healthcare professionals find, read and apply clinical evidence.",
                id.assistant_name,
                id.creator_attribution()
            ),
            IdentityIntent::Platform => format!(
                "{} is a professional network for healthcare workers. I'm {}, its built-in clinical \
                 assistant: I answer medical questions using recent peer-reviewed literature and can \
                 run common clinical calculations.",
                id.platform_name, id.assistant_name
            ),
            IdentityIntent::Generic => format!(
                "I'm {}, the clinical assistant of {}. Ask me about treatments, drug comparisons, \
                 study results or calculations such as BMI and creatinine clearance.",
                id.assistant_name, id.platform_name
            ),
        };
        format!("{body}\n\n{}", id.footer())
    }

    fn model_prompt(
        &self,
        query: &Query,
        evidence: Option<&EvidenceBundle>,
        calculation: Option<&CalculationResult>,
    ) -> String {
        let id = &self.identity;
        let mut out = format!(
            "You are {}, a clinical evidence assistant for healthcare professionals on {}.\n\n",
            id.assistant_name, id.platform_name
        );
        out.push_str(&format!("QUESTION:\n{}\n\n", query.message.trim()));
        if let Some(context) = query.context.as_deref().filter(|c| !c.trim().is_empty()) {
            out.push_str(&format!("RECENT CONVERSATION:\n{}\n\n", context.trim()));
        }

        match evidence {
            Some(bundle) if !bundle.is_empty() => {
                out.push_str(&format!(
                    "RETRIEVED EVIDENCE ({} studies):\n{}\n\n",
                    bundle.citations.len(),
                    bundle.formatted_text
                ));
                out.push_str(
                    "EVIDENCE RULES:\n\
                     - Cite every claim taken from the studies above by PMID, e.g. [PMID: 12345678].\n\
                     - Prefer quantitative findings (effect sizes, confidence intervals, p-values) over paraphrase.\n\
                     - Grade evidence quality from each study's design.\n\
                     - Cite only the studies listed above.\n\n",
                );
            }
            Some(_) => out.push_str(
                "NO STUDIES WERE RETRIEVED FOR THIS QUESTION.\n\
                 - Answer from established clinical knowledge and state clearly that no supporting studies were retrieved.\n\
                 - Do not invent citations, PMIDs or DOIs.\n\n",
            ),
            None => {}
        }

        if let Some(result) = calculation {
            let inputs = result
                .inputs
                .iter()
                .map(|input| format!("{} = {}", input.name, input.value))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(
                "CALCULATION RESULT:\n{}\nInputs: {inputs}\n",
                result.summary()
            ));
            for assumption in &result.assumptions {
                out.push_str(&format!("Assumption: {assumption}\n"));
            }
            out.push_str(
                "Integrate this result into the Clinical Assessment, explain it under Statistical \
                 Analysis and mention any assumption listed above.\n\n",
            );
        }

        out.push_str("Structure the answer with these sections:\n");
        for (heading, guidance) in ANSWER_SECTIONS {
            out.push_str(&format!("## {heading}\n{guidance}\n"));
        }
        out.push_str("\nEnd with this line exactly:\n");
        out.push_str(&id.closing_line());
        out
    }
}
