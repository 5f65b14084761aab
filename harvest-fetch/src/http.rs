//! JSON-over-HTTP source.
//!
//! Issues `GET <url>?<params>&page=<n>&page_size=<size>` and decodes the
//! body with [`PageResponse::from_value`]. Credentials come from an
//! environment variable named at build time.

use async_trait::async_trait;
use harvest_core::PageResponse;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::error::FetchError;
use crate::source::{QueryParams, Source};

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User agent string for harvest.
const USER_AGENT: &str = concat!("harvest/", env!("CARGO_PKG_VERSION"));

/// Longest response body excerpt kept in errors.
const BODY_EXCERPT_LEN: usize = 200;

// ============================================================================
// HTTP Source
// ============================================================================

/// A paginated source backed by a JSON HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpSource {
    id: String,
    url: Url,
    client: Client,
    api_key: Option<String>,
    api_key_env: Option<String>,
    page_param: String,
    page_size_param: String,
    timeout: Duration,
}

impl HttpSource {
    /// Starts building a source for `url`.
    pub fn builder(url: impl Into<String>) -> HttpSourceBuilder {
        HttpSourceBuilder::new(url)
    }

    /// The endpoint URL without paging parameters.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Builds the request URL for one page.
    pub fn page_url(&self, page: u32, page_size: u32, params: &QueryParams) -> Url {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair(&self.page_param, &page.to_string());
            query.append_pair(&self.page_size_param, &page_size.to_string());
        }
        url
    }
}

#[async_trait]
impl Source for HttpSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn validate(&self) -> Result<(), FetchError> {
        match (&self.api_key_env, &self.api_key) {
            (Some(env), None) => Err(FetchError::MissingCredentials(env.clone())),
            _ => Ok(()),
        }
    }

    #[instrument(skip(self, params), fields(source = %self.id))]
    async fn fetch(
        &self,
        page: u32,
        page_size: u32,
        params: &QueryParams,
    ) -> Result<PageResponse, FetchError> {
        let url = self.page_url(page, page_size, params);
        debug!(url = %url, "GET page");

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout.as_secs())
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status();
        debug!(status = %status, "Response received");

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(FetchError::RateLimited { retry_after });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::AuthenticationFailed(format!(
                "{} rejected the credentials ({status})",
                self.url
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(BODY_EXCERPT_LEN).collect(),
            });
        }

        let body: serde_json::Value = response.json().await?;
        Ok(PageResponse::from_value(body)?)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`HttpSource`].
#[derive(Debug, Clone)]
pub struct HttpSourceBuilder {
    url: String,
    id: Option<String>,
    api_key_env: Option<String>,
    page_param: String,
    page_size_param: String,
    timeout: Duration,
}

impl HttpSourceBuilder {
    /// Creates a builder for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            id: None,
            api_key_env: None,
            page_param: "page".to_string(),
            page_size_param: "page_size".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Sets the source identifier (defaults to the URL host).
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Requires a bearer token read from the environment variable `name`.
    #[must_use]
    pub fn api_key_env(mut self, name: impl Into<String>) -> Self {
        self.api_key_env = Some(name.into());
        self
    }

    /// Renames the page query parameter.
    #[must_use]
    pub fn page_param(mut self, name: impl Into<String>) -> Self {
        self.page_param = name.into();
        self
    }

    /// Renames the page-size query parameter.
    #[must_use]
    pub fn page_size_param(mut self, name: impl Into<String>) -> Self {
        self.page_size_param = name.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the source.
    ///
    /// A missing API key is not an error here; [`Source::validate`]
    /// reports it before the first request.
    pub fn build(self) -> Result<HttpSource, FetchError> {
        let url = Url::parse(&self.url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }

        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        let api_key = self
            .api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.trim().is_empty());

        let id = self
            .id
            .or_else(|| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());

        Ok(HttpSource {
            id,
            url,
            client,
            api_key,
            api_key_env: self.api_key_env,
            page_param: self.page_param,
            page_size_param: self.page_size_param,
            timeout: self.timeout,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
