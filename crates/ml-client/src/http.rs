//! Shared HTTP plumbing for the backend clients.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tracing::error;
use url::Url;

use crate::BackendError;

const USER_AGENT: &str = concat!("anime-recs/", env!("CARGO_PKG_VERSION"));

/// Longest error body we keep in a `BackendError::Status`
const MAX_ERROR_BODY: usize = 512;

pub fn build_client(timeout: Duration) -> Result<Client, BackendError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| BackendError::InvalidRequest(format!("failed to build HTTP client: {e}")))
}

/// Validate a base URL and strip any trailing slash
pub fn normalize_base_url(raw: &str) -> Result<String, BackendError> {
    Url::parse(raw).map_err(|e| BackendError::InvalidRequest(format!("invalid URL {raw:?}: {e}")))?;
    Ok(raw.trim_end_matches('/').to_string())
}

pub fn map_transport_error(service: &str, err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout {
            service: service.to_string(),
        }
    } else if err.is_decode() {
        BackendError::MalformedResponse(err.to_string())
    } else {
        BackendError::Connection {
            service: service.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Turn non-success statuses into `BackendError`s, passing successful responses through
pub async fn check_status(service: &str, response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        error!("{} rate limited the request", service);
        return Err(BackendError::RateLimited { retry_after_secs });
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    error!("{} returned HTTP {}", service, status.as_u16());
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}
