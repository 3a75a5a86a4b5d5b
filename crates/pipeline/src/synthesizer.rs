//! Response synthesis through a language model.
//!
//! ## Algorithm
//! 1. Build the prompt from the query and retrieval results
//! 2. No results: return the fallback text without calling the model
//! 3. Otherwise call the model, bounded by the per-call timeout
//! 4. Reject blank output as a malformed response

use std::sync::Arc;
use std::time::{Duration, Instant};

use ml_client::{BackendError, LanguageModel};
use retrieval::RetrievalResult;
use tracing::{debug, info, instrument, warn};

use crate::error::SynthesisError;
use crate::prompt::PromptBuilder;

pub const DEFAULT_FALLBACK_MESSAGE: &str = "I couldn't find any anime in the catalog that match \
that request. Try describing a genre, a mood or a show you already like.";

/// Outcome of a synthesis call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub text: String,
    /// True when the fallback was returned instead of model output
    pub used_fallback: bool,
}

#[derive(Clone)]
pub struct Synthesizer {
    model: Arc<dyn LanguageModel>,
    prompts: PromptBuilder,
    call_timeout: Duration,
    fallback_message: String,
}

impl Synthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, prompts: PromptBuilder) -> Self {
        Self {
            model,
            prompts,
            call_timeout: Duration::from_secs(30),
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }

    /// Configure the per-call timeout (default: 30s)
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Replace the text returned when retrieval found nothing.
    /// A blank message keeps the default.
    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        if !message.trim().is_empty() {
            self.fallback_message = message;
        }
        self
    }

    pub fn fallback_message(&self) -> &str {
        &self.fallback_message
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// The exact prompt `synthesize` would send for these inputs
    pub fn prompt_for(&self, query: &str, results: &RetrievalResult) -> Result<String, SynthesisError> {
        self.prompts.build(query, results)
    }

    /// Produce a recommendation for `query` grounded in `results`.
    ///
    /// Empty results never reach the model; the fallback text is returned
    /// with `used_fallback` set.
    #[instrument(skip(self, query, results), fields(model = self.model.model_name(), hits = results.len()))]
    pub async fn synthesize(
        &self,
        query: &str,
        results: &RetrievalResult,
    ) -> Result<Synthesis, SynthesisError> {
        let prompt = match self.prompts.build(query, results) {
            Ok(prompt) => prompt,
            Err(SynthesisError::EmptyContext) => {
                warn!("No retrieval hits, returning fallback message");
                return Ok(Synthesis {
                    text: self.fallback_message.clone(),
                    used_fallback: true,
                });
            }
            Err(e) => return Err(e),
        };
        debug!("Prompt is {} chars", prompt.len());

        let start = Instant::now();
        let output = tokio::time::timeout(self.call_timeout, self.model.generate(&prompt))
            .await
            .map_err(|_| {
                SynthesisError::Backend(BackendError::Timeout {
                    service: "language model".to_string(),
                })
            })?
            .map_err(SynthesisError::Backend)?;

        let text = output.trim();
        if text.is_empty() {
            return Err(SynthesisError::Backend(BackendError::MalformedResponse(
                "model returned an empty completion".to_string(),
            )));
        }

        info!("Synthesized {} chars in {:.2?}", text.len(), start.elapsed());
        Ok(Synthesis {
            text: text.to_string(),
            used_fallback: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use data_loader::AnimeDocument;
    use retrieval::ScoredRecord;
    use std::sync::Mutex;

    /// Echoes a scripted reply and records every prompt it saw
    struct ScriptedModel {
        reply: Result<String, BackendError>,
        delay: Duration,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn replying(reply: Result<&str, BackendError>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                delay: Duration::ZERO,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            tokio::time::sleep(self.delay).await;
            self.reply.clone()
        }
    }

    fn one_hit() -> RetrievalResult {
        RetrievalResult::from_hits(
            vec![ScoredRecord::new(AnimeDocument::new(1, "Clannad"), 0.9)],
            5,
        )
    }

    #[tokio::test]
    async fn test_synthesize_returns_trimmed_output() {
        let model = ScriptedModel::replying(Ok("  1. Clannad\n"));
        let synthesizer = Synthesizer::new(model.clone(), PromptBuilder::default());

        let out = synthesizer.synthesize("romance", &one_hit()).await.unwrap();
        assert_eq!(out.text, "1. Clannad");
        assert!(!out.used_fallback);

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(
            prompts[0],
            synthesizer.prompt_for("romance", &one_hit()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_empty_results_use_fallback_without_model_call() {
        let model = ScriptedModel::replying(Ok("unused"));
        let synthesizer = Synthesizer::new(model.clone(), PromptBuilder::default())
            .with_fallback_message("Nothing matched.");

        let out = synthesizer
            .synthesize("anything", &RetrievalResult::empty())
            .await
            .unwrap();
        assert_eq!(out.text, "Nothing matched.");
        assert!(out.used_fallback);
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_output_is_malformed() {
        let synthesizer =
            Synthesizer::new(ScriptedModel::replying(Ok("   ")), PromptBuilder::default());
        let err = synthesizer.synthesize("q", &one_hit()).await.unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::Backend(BackendError::MalformedResponse(_))
        ));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_backend_error_passes_through() {
        let synthesizer = Synthesizer::new(
            ScriptedModel::replying(Err(BackendError::RateLimited {
                retry_after_secs: Some(2),
            })),
            PromptBuilder::default(),
        );
        let err = synthesizer.synthesize("q", &one_hit()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_timeout() {
        let model = Arc::new(ScriptedModel {
            reply: Ok("late".into()),
            delay: Duration::from_millis(200),
            prompts: Mutex::new(Vec::new()),
        });
        let synthesizer = Synthesizer::new(model, PromptBuilder::default())
            .with_call_timeout(Duration::from_millis(20));

        let err = synthesizer.synthesize("q", &one_hit()).await.unwrap_err();
        assert_eq!(
            err,
            SynthesisError::Backend(BackendError::Timeout {
                service: "language model".into()
            })
        );
    }

    #[test]
    fn test_blank_fallback_keeps_default() {
        let synthesizer = Synthesizer::new(ScriptedModel::replying(Ok("x")), PromptBuilder::default())
            .with_fallback_message("  ");
        assert_eq!(synthesizer.fallback_message(), DEFAULT_FALLBACK_MESSAGE);
    }
}
