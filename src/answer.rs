use serde::Serialize;
use tracing::warn;

use crate::{
    generate::{GenerationBackend, PromptContext},
    resolver::{Classification, Resolution},
};

/// Character budget for template-synthesized answers.
pub const DEFAULT_TEMPLATE_BUDGET: usize = 500;

/// Number of passages combined by the synthesis strategies.
pub const SYNTHESIS_PASSAGES: usize = 2;

/// Marker appended when a template answer is truncated.
pub const ELLIPSIS: &str = "...";

/// Default refusal returned for Out-of-KB questions without a backend.
pub const DEFAULT_REFUSAL: &str = "I cannot answer this question as it is \
                                   outside the scope of the knowledge base.";

/// The engine's response to one query.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub classification: Classification,
    pub passages: Vec<String>,
    pub passage_ids: Vec<String>,
}

/// Tunables for the answer strategies.
#[derive(Debug, Clone)]
pub struct StrategyOptions {
    pub synthesis_passages: usize,
    pub template_budget: usize,
    pub refusal_text: String,
}

impl Default for StrategyOptions {
    fn default() -> Self {
        Self {
            synthesis_passages: SYNTHESIS_PASSAGES,
            template_budget: DEFAULT_TEMPLATE_BUDGET,
            refusal_text: DEFAULT_REFUSAL.to_string(),
        }
    }
}

/// Route a resolved topic to one of the three answer strategies.
///
/// - Known: the first passage verbatim; all passage variants under a Known
///   topic are paraphrases of a single fact.
/// - Inferred / Unknown: combine the top passages, via the configured
///   backend or the deterministic template.
/// - Out-of-KB: the fixed refusal, or an open-domain backend answer.
///
/// Backend failures never propagate: any error or empty response downgrades
/// to the deterministic result for the same classification, so this always
/// returns an `Answer`.
pub fn dispatch(
    question: &str,
    resolution: Resolution,
    backend: Option<&dyn GenerationBackend>,
    options: &StrategyOptions,
) -> Answer {
    let Resolution {
        classification,
        passages,
        passage_ids,
        scores: _,
    } = resolution;

    let answer = match classification {
        Classification::Known => passages
            .first()
            .cloned()
            .unwrap_or_else(|| options.refusal_text.clone()),

        Classification::Inferred | Classification::Unknown => {
            let selected =
                &passages[..passages.len().min(options.synthesis_passages)];
            let generated = backend.and_then(|b| {
                run_backend(
                    b,
                    &PromptContext::Grounded {
                        question,
                        passages: selected,
                    },
                )
            });
            generated.unwrap_or_else(|| {
                synthesize_template(selected, options.template_budget)
            })
        }

        Classification::OutOfKb => backend
            .and_then(|b| {
                run_backend(b, &PromptContext::OpenDomain { question })
            })
            .unwrap_or_else(|| options.refusal_text.clone()),
    };

    Answer {
        answer,
        classification,
        passages,
        passage_ids,
    }
}

/// Call the backend, downgrading every failure to None.
fn run_backend(
    backend: &dyn GenerationBackend,
    context: &PromptContext<'_>,
) -> Option<String> {
    match backend.generate(context) {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            warn!("generation backend returned blank text, falling back");
            None
        }
        Err(e) => {
            warn!(error = %e, "generation backend failed, falling back");
            None
        }
    }
}

/// Deterministic template synthesis: concatenate passages with a single
/// space and truncate to the character budget.
///
/// A truncated result is exactly `budget` characters long and ends with the
/// ellipsis marker.
pub fn synthesize_template(passages: &[String], budget: usize) -> String {
    let combined = passages.join(" ");
    if combined.chars().count() <= budget || budget <= ELLIPSIS.len() {
        return combined;
    }

    let mut truncated: String =
        combined.chars().take(budget - ELLIPSIS.len()).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
