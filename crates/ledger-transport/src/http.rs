//! HTTP client for the gateway's request/response endpoints.

use crate::error::{TransportError, TransportResult};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// Default timeout for a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    errors: Vec<Json>,
}

/// Authenticated HTTP client rooted at the gateway base URL.
#[derive(Clone)]
pub struct HttpClient {
    http_client: reqwest::Client,
    base_url: Url,
    token: String,
}

impl HttpClient {
    /// Create a client for `base_url`, sending `token` as a bearer credential.
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> TransportResult<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: normalize_base(base_url)?,
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn endpoint(&self, path: &str) -> TransportResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// URL of one item below `collection`. The id is percent-encoded as a
    /// single path segment; `.` and `..` are not ids.
    pub fn item_endpoint(&self, collection: &str, id: &str) -> TransportResult<Url> {
        if id.is_empty() || id == "." || id == ".." {
            return Err(TransportError::Protocol(format!("invalid path segment {:?}", id)));
        }
        let mut url = self.endpoint(collection)?;
        url.path_segments_mut()
            .map_err(|_| TransportError::Protocol(format!("{} cannot hold a path", collection)))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    /// POST a JSON body and return the `result` of the response.
    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> TransportResult<Json> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        unwrap_result(check_response(response).await?).await
    }

    /// GET and return the `result` of the response.
    pub async fn get_json(&self, path: &str) -> TransportResult<Json> {
        let url = self.endpoint(path)?;
        debug!(%url, "GET");
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        unwrap_result(check_response(response).await?).await
    }

    /// GET the raw body of the item `id` below `collection`.
    pub async fn get_bytes(&self, collection: &str, id: &str) -> TransportResult<Vec<u8>> {
        let url = self.item_endpoint(collection, id)?;
        debug!(%url, "GET (bytes)");
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let bytes = check_response(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// POST a raw `application/octet-stream` body and return the `result`.
    pub async fn post_bytes(&self, path: &str, body: Vec<u8>) -> TransportResult<Json> {
        let url = self.endpoint(path)?;
        debug!(%url, len = body.len(), "POST (bytes)");
        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;
        unwrap_result(check_response(response).await?).await
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Parse a base URL so that relative endpoint paths join below it.
pub fn normalize_base(base_url: &str) -> TransportResult<Url> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Check HTTP response for errors.
async fn check_response(response: reqwest::Response) -> TransportResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let errors = error_messages(status, &body);
    error!(status = status.as_u16(), ?errors, "Gateway request failed");
    Err(TransportError::Request {
        status: status.as_u16(),
        errors,
    })
}

async fn unwrap_result(response: reqwest::Response) -> TransportResult<Json> {
    take_result(response.json().await?)
}

/// Successful gateway responses are wrapped as `{"status": .., "result": ..}`.
/// A `null` result is a valid answer and is kept.
fn take_result(envelope: Json) -> TransportResult<Json> {
    match envelope {
        Json::Object(mut fields) => fields
            .remove("result")
            .ok_or_else(|| TransportError::Protocol("response without a result field".to_string())),
        _ => Err(TransportError::Protocol("response is not an object".to_string())),
    }
}

/// Error messages of a failed response; never empty.
pub fn error_messages(status: StatusCode, body: &str) -> Vec<String> {
    let from_envelope = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| {
            envelope
                .errors
                .into_iter()
                .map(|e| match e {
                    Json::String(s) => s,
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
        })
        .filter(|errors| !errors.is_empty());
    if let Some(errors) = from_envelope {
        return errors;
    }
    let body = body.trim();
    if !body.is_empty() {
        return vec![body.to_string()];
    }
    vec![status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))]
}
