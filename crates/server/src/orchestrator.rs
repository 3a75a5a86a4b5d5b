//! # Recommendation Orchestrator
//!
//! This module coordinates the recommendation pipeline:
//! 1. Normalize the query (blank or oversized input never reaches a backend)
//! 2. Retrieve the top-K nearest anime (embedding + vector search)
//! 3. Synthesize a recommendation from the hits, or fall back when empty
//! 4. Return the text
//!
//! Retrieval and synthesis are each wrapped in the configured
//! `RetryPolicy`; transient failures get a bounded retry, everything else
//! is surfaced immediately as a `RecommendationError`.
//!
//! The orchestrator is read-only after construction and cheap to clone, so
//! one instance is built at startup and shared by every request handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use data_loader::AnimeCatalog;
use ml_client::{ChatCompletionsClient, ChatSettings, Embedder, HuggingFaceEmbedder, LanguageModel};
use pipeline::{
    normalize_bounded, PromptBuilder, PromptTemplate, SynthesisError, Synthesizer,
    DEFAULT_MAX_QUERY_CHARS,
};
use retrieval::{
    ChromaIndex, InMemoryIndex, RetrievalError, RetrievalResult, Retriever, ScoredRecord,
    VectorIndex,
};

use crate::config::{AppConfig, ConfigError, Credentials, IndexKind};
use crate::error::{RecommendationError, StartupError};
use crate::retry::RetryPolicy;

/// Detailed result of one request
#[derive(Debug, Clone)]
pub struct Recommendation {
    /// The normalized query
    pub query: String,
    pub text: String,
    /// Retrieved records the text was grounded in, best first
    pub sources: Vec<ScoredRecord>,
    /// True when nothing was retrieved and the fallback text was returned
    pub used_fallback: bool,
    pub elapsed: Duration,
}

/// Main orchestrator that coordinates the recommendation pipeline
#[derive(Clone)]
pub struct RecommendationOrchestrator {
    retriever: Arc<Retriever>,
    synthesizer: Arc<Synthesizer>,
    top_k: usize,
    max_query_chars: usize,
    retry: RetryPolicy,
}

impl RecommendationOrchestrator {
    /// Assemble an orchestrator from ready-made components.
    ///
    /// A `top_k` of 0 is raised to 1.
    pub fn new(
        retriever: Retriever,
        synthesizer: Synthesizer,
        top_k: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            retriever: Arc::new(retriever),
            synthesizer: Arc::new(synthesizer),
            top_k: top_k.max(1),
            max_query_chars: DEFAULT_MAX_QUERY_CHARS,
            retry,
        }
    }

    /// Reject queries longer than `max` characters (default 1000)
    pub fn with_max_query_chars(mut self, max: usize) -> Self {
        self.max_query_chars = max;
        self
    }

    /// Build every backend client described by `config`.
    ///
    /// Fails fast: a missing index file, an unreachable Chroma collection, an
    /// unreadable prompt template or an invalid client setting aborts here,
    /// before any query is served.
    #[instrument(skip_all, fields(index = ?config.index.kind))]
    pub async fn from_config(
        config: &AppConfig,
        credentials: &Credentials,
    ) -> Result<Self, StartupError> {
        config.validate()?;
        let start = Instant::now();
        let timeout = config.runtime.request_timeout();

        let retriever = build_retriever(config, credentials.embedding_token.clone()).await?;

        let settings = ChatSettings {
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        };
        let model: Arc<dyn LanguageModel> = Arc::new(ChatCompletionsClient::new(
            &config.llm.base_url,
            credentials.llm_api_key.clone(),
            settings,
            timeout,
        )?);

        let template = match &config.prompt.template_path {
            Some(path) => PromptTemplate::from_file(path)?,
            None => PromptTemplate::default(),
        };
        let prompts = PromptBuilder::new(template)
            .with_max_context_chars(config.prompt.max_context_chars)
            .with_max_synopsis_chars(config.prompt.max_synopsis_chars)
            .with_max_query_chars(config.prompt.max_query_chars);
        let mut synthesizer = Synthesizer::new(model, prompts).with_call_timeout(timeout);
        if let Some(message) = &config.prompt.fallback_message {
            synthesizer = synthesizer.with_fallback_message(message.clone());
        }

        let retry = RetryPolicy::new(config.runtime.max_retries, config.runtime.retry_backoff());
        info!(
            "Pipeline ready in {:.2?} (index: {}, llm: {})",
            start.elapsed(),
            retriever.index_name(),
            synthesizer.model_name()
        );
        Ok(Self::new(retriever, synthesizer, config.retrieval.top_k, retry)
            .with_max_query_chars(config.prompt.max_query_chars))
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Main entry point: turn a free-text query into a recommendation
    pub async fn recommend(&self, query: &str) -> Result<String, RecommendationError> {
        self.recommend_detailed(query).await.map(|r| r.text)
    }

    /// Like `recommend`, also returning the retrieved sources and timing
    #[instrument(skip_all)]
    pub async fn recommend_detailed(
        &self,
        query: &str,
    ) -> Result<Recommendation, RecommendationError> {
        let start = Instant::now();

        let query = self.normalize(query)?;
        debug!("Normalized query: {:?}", query);

        let results = self.retrieve_with_retry(&query, self.top_k).await?;
        info!("Retrieved {} candidates", results.len());

        let (synthesis, attempts) = self
            .retry
            .run("synthesis", SynthesisError::is_transient, || {
                self.synthesizer.synthesize(&query, &results)
            })
            .await;
        let synthesis = synthesis.map_err(|e| RecommendationError::new(e, attempts))?;
        if synthesis.used_fallback {
            warn!("No anime matched the query, answered with fallback");
        }

        let elapsed = start.elapsed();
        info!("Total time to recommend: {:.2?}", elapsed);
        Ok(Recommendation {
            query,
            text: synthesis.text,
            sources: results.into_hits(),
            used_fallback: synthesis.used_fallback,
            elapsed,
        })
    }

    /// Retrieval only: the `k` nearest records for `query`
    pub async fn search(&self, query: &str, k: usize) -> Result<RetrievalResult, RecommendationError> {
        let query = self.normalize(query)?;
        self.retrieve_with_retry(&query, k).await
    }

    fn normalize(&self, raw: &str) -> Result<String, RecommendationError> {
        normalize_bounded(raw, self.max_query_chars).map_err(|e| RecommendationError::new(e, 1))
    }

    async fn retrieve_with_retry(
        &self,
        query: &str,
        k: usize,
    ) -> Result<RetrievalResult, RecommendationError> {
        let (results, attempts) = self
            .retry
            .run("retrieval", RetrievalError::is_transient, || {
                self.retriever.retrieve(query, k)
            })
            .await;
        results.map_err(|e| RecommendationError::new(e, attempts))
    }
}

/// The embedding client described by `[embedding]`
pub fn build_embedder(
    config: &AppConfig,
    api_token: Option<String>,
) -> Result<Arc<dyn Embedder>, StartupError> {
    Ok(Arc::new(HuggingFaceEmbedder::new(
        &config.embedding.base_url,
        config.embedding.model.clone(),
        api_token,
        config.runtime.request_timeout(),
    )?))
}

/// Embedder plus vector index, without the language model.
///
/// Retrieval-only callers use this so they need no language-model key.
pub async fn build_retriever(
    config: &AppConfig,
    embedding_token: Option<String>,
) -> Result<Retriever, StartupError> {
    let embedder = build_embedder(config, embedding_token)?;
    let index = build_index(config, embedder.model_name()).await?;
    if let Some(records) = index.len_hint() {
        info!("Vector index {} holds {} records", index.name(), records);
    }
    Ok(Retriever::new(embedder, index)
        .with_call_timeout(config.runtime.request_timeout())
        .with_min_score(config.retrieval.min_score))
}

async fn build_index(
    config: &AppConfig,
    embedding_model: &str,
) -> Result<Arc<dyn VectorIndex>, StartupError> {
    match config.index.kind {
        IndexKind::Local => {
            let path = config
                .index
                .path
                .as_deref()
                .ok_or_else(|| ConfigError::Invalid("index.path is required".into()))?;
            info!("Loading vector index from {}", path.display());
            let index = InMemoryIndex::load(path)?;
            warn_on_model_mismatch(index.catalog(), embedding_model);
            debug!("Catalog dimension: {:?}", index.catalog().dimension());
            Ok(Arc::new(index))
        }
        IndexKind::Chroma => {
            let (Some(url), Some(collection)) = (&config.index.url, &config.index.collection)
            else {
                return Err(
                    ConfigError::Invalid("index.url and index.collection are required".into())
                        .into(),
                );
            };
            let index =
                ChromaIndex::connect(url, collection, config.runtime.request_timeout()).await?;
            Ok(Arc::new(index))
        }
    }
}

fn warn_on_model_mismatch(catalog: &AnimeCatalog, embedding_model: &str) {
    if catalog.model() != embedding_model {
        warn!(
            "Index was built with {} but queries are embedded with {}",
            catalog.model(),
            embedding_model
        );
    }
}
