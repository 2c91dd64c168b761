use super::{ApiError, Session};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub(crate) const TOKEN_PATH: &[&str] = &["api", "token"];

/// HTTP client for the admin REST API.
///
/// Every request carries the session's bearer token when there is one. A 401
/// from any endpoint other than the token endpoint clears the session and
/// surfaces as [`ApiError::SessionExpired`].
#[derive(Clone, Debug)]
pub struct ApiClient {
    base_url: Url,
    http: Client,
    session: Arc<Session>,
}

impl ApiClient {
    /// `timeout` of `None` keeps the transport default.
    pub fn new(
        base_url: &str,
        session: Arc<Session>,
        timeout: Option<Duration>,
    ) -> Result<Self, ApiError> {
        let base_url = Self::parse_base_url(base_url)?;

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            base_url,
            http,
            session,
        })
    }

    pub(crate) fn parse_base_url(raw: &str) -> Result<Url, ApiError> {
        let url = Url::parse(raw)
            .map_err(|e| ApiError::InvalidUrl(format!("Failed to parse {raw}: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(format!(
                "Unsupported scheme '{}' in {raw}",
                url.scheme()
            )));
        }
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(ApiError::InvalidUrl(format!("{raw} must contain a host")));
        }
        Ok(url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Build an endpoint URL below the base. An empty trailing segment yields a
    /// trailing slash (`["api", "backups", ""]` -> `/api/backups/`).
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send and map non-2xx responses to errors.
    pub(crate) async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let request = builder.build()?;
        let method = request.method().clone();
        let path = request.url().path().to_string();

        let response = self.http.execute(request).await?;
        let status = response.status();
        debug!("{} {} -> {}", method, path, status);

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED && !self.is_token_endpoint(&path) {
            warn!("Received 401 from {}; clearing session", path);
            self.session.clear();
            return Err(ApiError::SessionExpired);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_response_body(status, &body))
    }

    fn is_token_endpoint(&self, path: &str) -> bool {
        self.endpoint(TOKEN_PATH)
            .map(|url| url.path() == path)
            .unwrap_or(false)
    }

    pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        let response = self.send(self.request(Method::GET, url)).await?;
        Self::decode(response).await
    }

    pub(crate) async fn send_json<B, T>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        let mut builder = self.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = self.send(builder).await?;
        Self::decode(response).await
    }
}
