use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

/// Default request timeout for the HTTP generation backend.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Failures of the generation backend.
///
/// These never reach the caller of the engine: the dispatcher catches them
/// at its boundary and falls back to the deterministic answer.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("backend returned an empty response")]
    EmptyResponse,
}

/// The prompt shapes sent to a generation backend.
///
/// `Grounded` carries the matched passages for synthesis; `OpenDomain` is
/// used for Out-of-KB questions, where no passages exist and the backend
/// answers from general knowledge.
#[derive(Debug, Clone)]
pub enum PromptContext<'a> {
    Grounded {
        question: &'a str,
        passages: &'a [String],
    },
    OpenDomain {
        question: &'a str,
    },
}

impl PromptContext<'_> {
    /// Render the prompt text for this context.
    pub fn render(&self) -> String {
        match self {
            Self::Grounded { question, passages } => {
                let context = passages
                    .iter()
                    .enumerate()
                    .map(|(i, p)| format!("Passage {}: {p}", i + 1))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                format!(
                    "Question: {question}\n\n\
                     Context from the source text:\n{context}\n\n\
                     Please provide a comprehensive answer by synthesizing \
                     information from the passages above."
                )
            }
            Self::OpenDomain { question } => format!(
                "Question: {question}\n\n\
                 This question requires inference beyond the indexed text. \
                 Please answer based on your general knowledge of the work, \
                 or explain why this cannot be answered."
            ),
        }
    }
}

/// External, pluggable text-generation capability.
///
/// Implementations must bound their own latency (the engine issues the call
/// synchronously and falls back on error); tests substitute deterministic
/// stubs.
pub trait GenerationBackend: Send + Sync {
    fn generate(
        &self,
        context: &PromptContext<'_>,
    ) -> Result<String, GenerationError>;
}

/// Generation backend speaking the OpenAI-compatible `/v1/chat/completions`
/// protocol.
///
/// Applies a hard request timeout and retries once on transport errors;
/// anything else surfaces as a `GenerationError` for the dispatcher to
/// downgrade.
pub struct HttpGenerator {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl HttpGenerator {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                GenerationError::Request(format!(
                    "cannot build HTTP client: {e}"
                ))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    fn request_once(&self, prompt: &str) -> Result<String, GenerationError> {
        #[derive(serde::Serialize)]
        struct ChatMessage<'a> {
            role: &'static str,
            content: &'a str,
        }
        #[derive(serde::Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
        }

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let parsed: ChatApiResponse = response
            .json()
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }
}

impl GenerationBackend for HttpGenerator {
    fn generate(
        &self,
        context: &PromptContext<'_>,
    ) -> Result<String, GenerationError> {
        let prompt = context.render();

        match self.request_once(&prompt) {
            // One bounded retry on transport errors only; the dispatcher
            // fallback covers everything else.
            Err(GenerationError::Request(first)) => {
                debug!(error = %first, "generation request failed, retrying once");
                self.request_once(&prompt)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grounded_prompt_contains_question_and_passages() {
        let passages = vec![
            "Juliet is the sun.".to_string(),
            "Arise, fair sun.".to_string(),
        ];
        let prompt = PromptContext::Grounded {
            question: "What metaphor does Romeo use?",
            passages: &passages,
        }
        .render();

        assert!(prompt.contains("What metaphor does Romeo use?"));
        assert!(prompt.contains("Passage 1: Juliet is the sun."));
        assert!(prompt.contains("Passage 2: Arise, fair sun."));
    }

    #[test]
    fn open_domain_prompt_has_no_passage_section() {
        let prompt = PromptContext::OpenDomain {
            question: "What if they had smartphones?",
        }
        .render();

        assert!(prompt.contains("What if they had smartphones?"));
        assert!(!prompt.contains("Passage 1"));
        assert!(prompt.contains("general knowledge"));
    }

    #[test]
    fn prompt_shapes_differ() {
        let passages: Vec<String> = vec![];
        let grounded = PromptContext::Grounded {
            question: "q",
            passages: &passages,
        }
        .render();
        let open = PromptContext::OpenDomain { question: "q" }.render();
        assert_ne!(grounded, open);
    }
}
