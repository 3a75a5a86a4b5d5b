//! HuggingFace feature-extraction embedding client.
//!
//! Posts batches of texts to the hosted inference pipeline:
//!
//! ```text
//! POST {base_url}/pipeline/feature-extraction/{model}
//! {"inputs": ["..."], "options": {"wait_for_model": true}}
//! ```
//!
//! Sentence-transformer models answer with one vector per input. Plain
//! encoder models answer with one vector per token; those are mean-pooled.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::http::{build_client, check_status, map_transport_error, normalize_base_url};
use crate::{BackendError, Embedder};

const SERVICE: &str = "embedding backend";

pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [String],
    options: RequestOptions,
}

#[derive(Serialize)]
struct RequestOptions {
    wait_for_model: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureExtractionResponse {
    Pooled(Vec<Vec<f32>>),
    PerToken(Vec<Vec<Vec<f32>>>),
}

/// Client for the HuggingFace feature-extraction pipeline
#[derive(Clone)]
pub struct HuggingFaceEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    api_token: Option<String>,
}

impl HuggingFaceEmbedder {
    /// Create a client for `model` served under `base_url`.
    ///
    /// The token is optional; anonymous requests work for public models
    /// but are rate limited much harder.
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let model = model.into();
        let base = normalize_base_url(base_url)?;
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: format!("{base}/pipeline/feature-extraction/{model}"),
            model,
            api_token,
        })
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, texts), fields(model = %self.model, batch = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = FeatureExtractionRequest {
            inputs: texts,
            options: RequestOptions {
                wait_for_model: true,
            },
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;
        let parsed: FeatureExtractionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        let vectors = match parsed {
            FeatureExtractionResponse::Pooled(vectors) => vectors,
            FeatureExtractionResponse::PerToken(tokens) => {
                tokens.iter().map(|t| mean_pool(t)).collect::<Result<_, _>>()?
            }
        };

        validate_vectors(&vectors, texts.len())?;
        debug!("Embedded {} texts", vectors.len());
        Ok(vectors)
    }
}

fn mean_pool(tokens: &[Vec<f32>]) -> Result<Vec<f32>, BackendError> {
    let first = tokens
        .first()
        .ok_or_else(|| BackendError::MalformedResponse("empty token matrix".into()))?;
    let mut pooled = vec![0.0f32; first.len()];
    for token in tokens {
        if token.len() != pooled.len() {
            return Err(BackendError::MalformedResponse(
                "ragged token matrix".into(),
            ));
        }
        for (acc, v) in pooled.iter_mut().zip(token) {
            *acc += v;
        }
    }
    let n = tokens.len() as f32;
    pooled.iter_mut().for_each(|v| *v /= n);
    Ok(pooled)
}

fn validate_vectors(vectors: &[Vec<f32>], expected: usize) -> Result<(), BackendError> {
    if vectors.len() != expected {
        return Err(BackendError::MalformedResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }
    if vectors.iter().any(|v| v.is_empty()) {
        return Err(BackendError::MalformedResponse("empty embedding".into()));
    }
    if vectors.iter().flatten().any(|x| !x.is_finite()) {
        return Err(BackendError::MalformedResponse(
            "non-finite embedding component".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

    fn embedder(server: &MockServer, token: Option<&str>) -> HuggingFaceEmbedder {
        HuggingFaceEmbedder::new(
            &server.uri(),
            MODEL,
            token.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_embed_pooled_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/pipeline/feature-extraction/{MODEL}")))
            .and(header("authorization", "Bearer hf_test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([[0.1, 0.2], [0.3, 0.4]])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let vectors = embedder(&server, Some("hf_test"))
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn test_embed_mean_pools_token_vectors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([[[1.0, 3.0], [3.0, 5.0]]])),
            )
            .mount(&server)
            .await;

        let vector = embedder(&server, None).embed_query("q").await.unwrap();
        assert_eq!(vector, vec![2.0, 4.0]);
    }

    #[tokio::test]
    async fn test_embed_count_mismatch_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([[0.1]])))
            .mount(&server)
            .await;

        let err = embedder(&server, None)
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_embed_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading"))
            .mount(&server)
            .await;

        let err = embedder(&server, None).embed_query("q").await.unwrap_err();
        assert_eq!(
            err,
            BackendError::Status {
                status: 503,
                body: "loading".into()
            }
        );
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_embed_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([[0.1]]))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client =
            HuggingFaceEmbedder::new(&server.uri(), MODEL, None, Duration::from_millis(50)).unwrap();
        let err = client.embed_query("q").await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_embed_empty_batch_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let vectors = embedder(&server, None).embed(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
