use crate::cache::Params;
use crate::config::Config;
use crate::error::ApiError;
use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const USER_AGENT_VALUE: &str = concat!("booklend/", env!("CARGO_PKG_VERSION"));

/// HTTP verbs the library API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
  Get,
  Post,
  Put,
  Delete,
}

impl Verb {
  fn as_method(self) -> reqwest::Method {
    match self {
      Verb::Get => reqwest::Method::GET,
      Verb::Post => reqwest::Method::POST,
      Verb::Put => reqwest::Method::PUT,
      Verb::Delete => reqwest::Method::DELETE,
    }
  }
}

/// A request relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub verb: Verb,
  pub path: String,
  pub query: Params,
  pub body: Option<Value>,
}

impl ApiRequest {
  pub fn get(path: impl Into<String>, query: Params) -> Self {
    Self {
      verb: Verb::Get,
      path: path.into(),
      query,
      body: None,
    }
  }

  pub fn new(verb: Verb, path: impl Into<String>, body: Option<Value>) -> Self {
    Self {
      verb,
      path: path.into(),
      query: Params::new(),
      body,
    }
  }
}

/// Anything that can carry an [`ApiRequest`] to the server.
///
/// The returned future is `Send + 'static` so it can run on a spawned task
/// while the UI thread keeps going.
pub trait Transport: Send + Sync + 'static {
  fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<Value, ApiError>>;
}

/// Bearer credential shared between the session and the HTTP client.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
  token: Arc<RwLock<Option<String>>>,
}

impl Credentials {
  pub fn new(token: Option<String>) -> Self {
    Self {
      token: Arc::new(RwLock::new(token)),
    }
  }

  pub fn token(&self) -> Option<String> {
    // A poisoned lock degrades to an unauthenticated request.
    self.token.read().ok().and_then(|t| t.clone())
  }

  pub fn set(&self, token: impl Into<String>) {
    if let Ok(mut guard) = self.token.write() {
      *guard = Some(token.into());
    }
  }

  pub fn clear(&self) {
    if let Ok(mut guard) = self.token.write() {
      *guard = None;
    }
  }

  pub fn is_present(&self) -> bool {
    self.token().is_some()
  }
}

/// Library API client
#[derive(Clone)]
pub struct ApiClient {
  client: reqwest::Client,
  base_url: Url,
  credentials: Credentials,
}

impl ApiClient {
  pub fn new(config: &Config, credentials: Credentials) -> Result<Self> {
    Self::with_base_url(&config.api.url, config.api.timeout_secs, credentials)
  }

  pub fn with_base_url(base_url: &str, timeout_secs: u64, credentials: Credentials) -> Result<Self> {
    // Url::join drops the last path segment unless the base ends with '/'
    let normalized = if base_url.ends_with('/') {
      base_url.to_string()
    } else {
      format!("{}/", base_url)
    };
    let base_url =
      Url::parse(&normalized).map_err(|e| eyre!("Invalid API URL {}: {}", base_url, e))?;

    let mut default_headers = HeaderMap::new();
    default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(timeout_secs))
      .default_headers(default_headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url,
      credentials,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  fn url_for(&self, request: &ApiRequest) -> Result<Url, ApiError> {
    let mut url = self
      .base_url
      .join(request.path.trim_start_matches('/'))
      .map_err(|e| ApiError::validation(format!("invalid path {}: {}", request.path, e)))?;

    if !request.query.is_empty() {
      url.query_pairs_mut().extend_pairs(request.query.iter());
    }

    Ok(url)
  }

  /// Perform a single request. No retries.
  pub async fn execute(&self, request: ApiRequest) -> Result<Value, ApiError> {
    let url = self.url_for(&request)?;
    debug!(verb = ?request.verb, url = %url, "api request");

    let mut builder = self.client.request(request.verb.as_method(), url.clone());

    match self.credentials.token() {
      Some(token) => builder = builder.header(AUTHORIZATION, format!("Bearer {}", token)),
      None => debug!("no credential, sending unauthenticated request"),
    }

    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder.send().await.map_err(|e| {
      warn!(url = %url, error = %e, "request failed before reaching the server");
      ApiError::network(e.to_string())
    })?;

    let status = response.status();
    let text = response
      .text()
      .await
      .map_err(|e| ApiError::network(format!("failed to read response body: {}", e)))?;

    if !status.is_success() {
      warn!(url = %url, status = status.as_u16(), "server rejected request");
      return Err(ApiError::server(status.as_u16(), text));
    }

    if text.trim().is_empty() {
      return Ok(Value::Null);
    }

    serde_json::from_str(&text)
      .map_err(|e| ApiError::invalid_response(format!("{} returned malformed JSON: {}", url, e)))
  }
}

impl Transport for ApiClient {
  fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<Value, ApiError>> {
    let client = self.clone();
    Box::pin(async move { client.execute(request).await })
  }
}
