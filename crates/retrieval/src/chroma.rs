//! Chroma HTTP vector index.
//!
//! The collection is resolved by name when the index is connected, so a
//! missing collection or an unreachable server fails at startup rather than
//! on the first query. Queries go to:
//!
//! ```text
//! POST {base_url}/api/v1/collections/{collection_id}/query
//! {"query_embeddings": [[...]], "n_results": k, "include": ["documents", "metadatas", "distances"]}
//! ```
//!
//! The collection must be created with `hnsw:space = cosine`; the score is
//! `1 - distance`.
//!
//! Outages (transport errors, 429, 5xx) map to `IndexError::Unavailable`.
//! Any other non-success status means Chroma refused the request and maps to
//! the permanent `IndexError::Rejected`. When the collection reports its
//! dimension, query vectors of another size fail locally with
//! `DimensionMismatch` without a round trip.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use data_loader::{AnimeDocument, AnimeId};
use data_loader::parser::parse_genres;
use ml_client::BackendError;
use ml_client::http::{build_client, check_status, map_transport_error, normalize_base_url};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::IndexError;
use crate::index::VectorIndex;
use crate::types::ScoredRecord;

const SERVICE: &str = "chroma";

#[derive(Deserialize)]
struct CollectionInfo {
    id: String,
    name: String,
    #[serde(default)]
    dimension: Option<usize>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query_embeddings: [&'a [f32]; 1],
    n_results: usize,
    include: [&'static str; 3],
}

/// Column-oriented query response, one inner list per query embedding
#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<HashMap<String, Value>>>>>,
}

/// Remote index backed by a Chroma collection
pub struct ChromaIndex {
    client: Client,
    query_url: Url,
    collection_name: String,
    dimension: Option<usize>,
}

impl ChromaIndex {
    /// Resolve `collection` on the Chroma server at `base_url`.
    #[instrument(skip_all, fields(collection = %collection))]
    pub async fn connect(
        base_url: &str,
        collection: &str,
        timeout: Duration,
    ) -> Result<Self, IndexError> {
        let base = normalize_base_url(base_url).map_err(index_error)?;
        let client = build_client(timeout).map_err(index_error)?;

        info!("Resolving Chroma collection {} at {}", collection, base);
        let response = client
            .get(collection_url(&base, &[collection])?)
            .send()
            .await
            .map_err(|e| index_error(map_transport_error(SERVICE, e)))?;
        let response = check_status(SERVICE, response).await.map_err(index_error)?;
        let info: CollectionInfo = response
            .json()
            .await
            .map_err(|e| IndexError::Rejected(format!("bad collection payload: {e}")))?;

        debug!(
            "Chroma collection {} has id {} (dimension {:?})",
            info.name, info.id, info.dimension
        );
        Ok(Self {
            client,
            query_url: collection_url(&base, &[info.id.as_str(), "query"])?,
            collection_name: info.name,
            dimension: info.dimension,
        })
    }
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    fn name(&self) -> &str {
        "chroma"
    }

    #[instrument(skip(self, query), fields(collection = %self.collection_name))]
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>, IndexError> {
        if let Some(expected) = self.dimension {
            if expected != query.len() {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    found: query.len(),
                });
            }
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let body = QueryRequest {
            query_embeddings: [query],
            n_results: k,
            include: ["documents", "metadatas", "distances"],
        };
        let response = self
            .client
            .post(self.query_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| index_error(map_transport_error(SERVICE, e)))?;
        let response = check_status(SERVICE, response).await.map_err(index_error)?;
        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| IndexError::Rejected(format!("bad query payload: {e}")))?;

        let hits = into_hits(parsed);
        debug!("Chroma returned {} hits", hits.len());
        Ok(hits)
    }
}

/// Outages stay retryable; everything else Chroma refused is permanent
fn index_error(err: BackendError) -> IndexError {
    if err.is_transient() {
        IndexError::Unavailable(err.to_string())
    } else {
        IndexError::Rejected(err.to_string())
    }
}

/// `{base}/api/v1/collections/{segments..}` with every segment percent-encoded
fn collection_url(base: &str, segments: &[&str]) -> Result<Url, IndexError> {
    let mut url =
        Url::parse(base).map_err(|e| IndexError::Rejected(format!("invalid URL {base:?}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| IndexError::Rejected(format!("{base} cannot carry a path")))?
        .pop_if_empty()
        .extend(["api", "v1", "collections"])
        .extend(segments);
    Ok(url)
}

fn into_hits(response: QueryResponse) -> Vec<ScoredRecord> {
    let ids = response.ids.into_iter().next().unwrap_or_default();
    let mut distances = first_column(response.distances);
    let mut documents = first_column(response.documents);
    let mut metadatas = first_column(response.metadatas);

    ids.into_iter()
        .enumerate()
        .map(|(rank, raw_id)| {
            let distance = distances.get_mut(rank).and_then(Option::take);
            let document = documents.get_mut(rank).and_then(Option::take);
            let metadata = metadatas.get_mut(rank).and_then(Option::take).unwrap_or_default();

            let score = distance.map(|d| 1.0 - d).unwrap_or(f32::NAN);
            ScoredRecord::new(to_document(&raw_id, rank, document, &metadata), score)
        })
        .collect()
}

fn first_column<T>(column: Option<Vec<Vec<Option<T>>>>) -> Vec<Option<T>> {
    column
        .and_then(|c| c.into_iter().next())
        .unwrap_or_default()
}

/// Build a document from Chroma's id / document / metadata triple.
///
/// Collections written by this tool carry `anime_id`, `title` and `genres`
/// metadata with the synopsis as the document. Collections holding only the
/// combined "Title: .. Overview: .. Genres: .." text are parsed back apart.
fn to_document(
    raw_id: &str,
    rank: usize,
    document: Option<String>,
    metadata: &HashMap<String, Value>,
) -> AnimeDocument {
    let id: AnimeId = metadata
        .get("anime_id")
        .and_then(Value::as_u64)
        .or_else(|| raw_id.parse().ok())
        .unwrap_or((rank + 1) as AnimeId);
    let text = document.unwrap_or_default();

    match metadata.get("title").and_then(Value::as_str) {
        Some(title) => {
            let genres = metadata
                .get("genres")
                .and_then(Value::as_str)
                .map(parse_genres)
                .unwrap_or_default();
            AnimeDocument::new(id, title)
                .with_synopsis(text)
                .with_genres(genres)
        }
        None => split_combined_text(id, &text),
    }
}

fn split_combined_text(id: AnimeId, text: &str) -> AnimeDocument {
    let Some(rest) = text.strip_prefix("Title: ") else {
        return AnimeDocument::new(id, text.trim());
    };
    let (title, rest) = rest.split_once(" Overview: ").unwrap_or((rest, ""));
    let (synopsis, genres) = rest.rsplit_once(" Genres: ").unwrap_or((rest, ""));

    AnimeDocument::new(id, title.trim())
        .with_synopsis(synopsis.trim())
        .with_genres(parse_genres(genres))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_collection(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/v1/collections/anime"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "c0ffee", "name": "anime"})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_connect_and_search() {
        let server = MockServer::start().await;
        mount_collection(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/v1/collections/c0ffee/query"))
            .and(body_partial_json(serde_json::json!({"n_results": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ids": [["20", "21"]],
                "distances": [[0.1, 0.4]],
                "documents": [["Ninja story.", "Pirate story."]],
                "metadatas": [[
                    {"anime_id": 20, "title": "Naruto", "genres": "Action, Adventure"},
                    {"anime_id": 21, "title": "One Piece", "genres": "Action, Comedy"}
                ]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let index = ChromaIndex::connect(&server.uri(), "anime", Duration::from_secs(5))
            .await
            .unwrap();
        let hits = index.search(&[0.1, 0.2], 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.title, "Naruto");
        assert_eq!(hits[0].document.id, 20);
        assert_eq!(hits[0].document.genres, vec!["Action", "Adventure"]);
        assert!((hits[0].score - 0.9).abs() < 1e-6);
        assert!((hits[1].score - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_connect_missing_collection_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("collection not found"))
            .mount(&server)
            .await;

        let result = ChromaIndex::connect(&server.uri(), "anime", Duration::from_secs(5)).await;
        assert!(matches!(result, Err(IndexError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_collection_name_is_escaped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/collections/seasonal%2F2024%20picks"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "abc 1", "name": "seasonal/2024 picks"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/collections/abc%201/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ids": [[]]})))
            .expect(1)
            .mount(&server)
            .await;

        let index = ChromaIndex::connect(&server.uri(), "seasonal/2024 picks", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(index.search(&[0.1], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_bad_request_is_rejected() {
        let server = MockServer::start().await;
        mount_collection(&server).await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string("Embedding dimension 2 does not match collection dimensionality 3"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let index = ChromaIndex::connect(&server.uri(), "anime", Duration::from_secs(5))
            .await
            .unwrap();
        let err = index.search(&[0.1, 0.2], 3).await.unwrap_err();
        assert!(matches!(err, IndexError::Rejected(_)));
        assert!(!crate::RetrievalError::from(err).is_transient());
    }

    #[tokio::test]
    async fn test_known_dimension_is_checked_locally() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/collections/anime"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"id": "c0ffee", "name": "anime", "dimension": 3}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ids": [[]]})))
            .expect(0)
            .mount(&server)
            .await;

        let index = ChromaIndex::connect(&server.uri(), "anime", Duration::from_secs(5))
            .await
            .unwrap();
        let err = index.search(&[0.1, 0.2], 3).await.unwrap_err();
        assert_eq!(err, IndexError::DimensionMismatch { expected: 3, found: 2 });
    }

    #[tokio::test]
    async fn test_search_server_error_is_unavailable() {
        let server = MockServer::start().await;
        mount_collection(&server).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let index = ChromaIndex::connect(&server.uri(), "anime", Duration::from_secs(5))
            .await
            .unwrap();
        let err = index.search(&[0.1], 3).await.unwrap_err();
        assert!(matches!(err, IndexError::Unavailable(_)));
        assert!(crate::RetrievalError::from(err).is_transient());
    }

    #[test]
    fn test_split_combined_text() {
        let doc = split_combined_text(
            3,
            "Title: Nana Overview: Two women, same name. Genres: Drama, Romance",
        );
        assert_eq!(doc.title, "Nana");
        assert_eq!(doc.synopsis, "Two women, same name.");
        assert_eq!(doc.genres, vec!["Drama", "Romance"]);
    }

    #[test]
    fn test_missing_distances_produce_unscored_hits() {
        let response = QueryResponse {
            ids: vec![vec!["x".into()]],
            distances: None,
            documents: None,
            metadatas: None,
        };
        let hits = into_hits(response);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score.is_nan());
        assert_eq!(hits[0].document.id, 1);
    }
}
