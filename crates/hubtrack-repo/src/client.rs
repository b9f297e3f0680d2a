//! HTTP client with redirect protection
//!
//! Redirects are followed manually so that credentials (basic auth or a
//! GitHub token) are only ever sent to the origin of the first request.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{RepoError, Result};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REDIRECTS: u32 = 10;

/// Run `fut` unless `cancel` fires first
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RepoError::Cancelled),
        result = fut => result,
    }
}

/// Shared HTTP client
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            // Redirects are handled in `GetRequest::send` to avoid credential leaks
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| RepoError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self { client })
    }

    /// Start building a GET request
    pub fn get(&self, url: &str) -> GetRequest<'_> {
        GetRequest {
            client: self,
            url: url.to_string(),
            basic_auth: None,
            token: None,
            headers: Vec::new(),
        }
    }
}

/// GET request under construction
pub struct GetRequest<'a> {
    client: &'a HttpClient,
    url: String,
    basic_auth: Option<(String, String)>,
    token: Option<String>,
    headers: Vec<(&'static str, String)>,
}

impl GetRequest<'_> {
    pub fn basic_auth(mut self, credentials: Option<(&str, &str)>) -> Self {
        self.basic_auth = credentials.map(|(u, p)| (u.to_string(), p.to_string()));
        self
    }

    /// `Authorization: token <t>` as GitHub expects it
    pub fn token(mut self, token: Option<&str>) -> Self {
        self.token = token.filter(|t| !t.is_empty()).map(str::to_string);
        self
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Send the request, following redirects
    ///
    /// The final response is returned whatever its status.
    pub async fn send(self) -> Result<reqwest::Response> {
        let original = Url::parse(&self.url)?;
        let mut current = original.clone();
        let mut redirects = 0;

        loop {
            let mut request = self.client.client.get(current.clone());
            for (name, value) in &self.headers {
                request = request.header(*name, value);
            }

            if same_origin(&original, &current) {
                if let Some(token) = &self.token {
                    request = request.header("Authorization", format!("token {}", token));
                }
                if let Some((user, pass)) = &self.basic_auth {
                    request = request.basic_auth(user, Some(pass));
                }
            } else if self.token.is_some() || self.basic_auth.is_some() {
                tracing::debug!(
                    from = %original,
                    to = %current,
                    "cross-origin redirect, credentials not forwarded"
                );
            }

            let response = request.send().await?;
            if !response.status().is_redirection() {
                return Ok(response);
            }

            redirects += 1;
            if redirects > MAX_REDIRECTS {
                return Err(RepoError::NetworkError {
                    message: format!("Too many redirects (max {})", MAX_REDIRECTS),
                });
            }

            let location = response
                .headers()
                .get("Location")
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| RepoError::NetworkError {
                    message: "Redirect without Location header".to_string(),
                })?;
            current = current.join(location)?;
        }
    }

    /// Send the request and return the body of a `200 OK` response
    pub async fn bytes(self) -> Result<Vec<u8>> {
        let response = self.send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(RepoError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Check if two URLs are same-origin
fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host() == b.host()
        && a.port_or_known_default() == b.port_or_known_default()
}
