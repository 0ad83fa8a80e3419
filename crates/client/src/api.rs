//! Authenticated request pipeline for the feedback backend
//!
//! Every call goes through [`ApiClient::request`], which makes sure a
//! token is held, assembles headers, dispatches, and recovers once from a
//! 401/403 by re-running the handshake.

use crate::auth::AuthService;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::store::TokenStore;
use crate::types::{RequestBody, RequestOptions, success_sentinel};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Method, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const API_KEY_HEADER: &str = "x-api-key";
const DEFAULT_USER_AGENT: &str = concat!("feedback-client/", env!("CARGO_PKG_VERSION"));

/// Feedback backend client
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    api_key: HeaderValue,
    auth: Arc<AuthService>,
}

impl ApiClient {
    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Build a client from loaded configuration
    pub fn from_config(config: &ClientConfig, store: TokenStore) -> Result<Self> {
        config.validate()?;
        let mut builder = Self::builder()
            .base_url(&config.base_url)
            .identity_url(&config.identity_url)
            .api_key(&config.api_key)
            .user_agent(&config.user_agent)
            .token_store(store);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder.build()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth(&self) -> &Arc<AuthService> {
        &self.auth
    }

    /// Issue one authenticated call and decode its JSON response
    #[instrument(name = "api_request", skip(self, options), fields(method = %options.method))]
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<Value> {
        let result = self.execute(endpoint, &options).await;
        if let Err(e) = &result {
            debug!(error = %e, "API error: {endpoint}");
        }
        result
    }

    pub async fn get(&self, endpoint: &str) -> Result<Value> {
        self.request(endpoint, RequestOptions::new(Method::GET)).await
    }

    pub async fn post(&self, endpoint: &str, body: impl Into<RequestBody>) -> Result<Value> {
        self.request(endpoint, RequestOptions::new(Method::POST).body(body))
            .await
    }

    pub async fn put(&self, endpoint: &str, body: impl Into<RequestBody>) -> Result<Value> {
        self.request(endpoint, RequestOptions::new(Method::PUT).body(body))
            .await
    }

    pub async fn patch(&self, endpoint: &str, body: impl Into<RequestBody>) -> Result<Value> {
        self.request(endpoint, RequestOptions::new(Method::PATCH).body(body))
            .await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Value> {
        self.request(endpoint, RequestOptions::new(Method::DELETE))
            .await
    }

    async fn execute(&self, endpoint: &str, options: &RequestOptions) -> Result<Value> {
        if !self.auth.is_authenticated().await? {
            debug!("Not authenticated, attempting biometric authentication");
            self.auth.authenticate_with_biometrics().await?;
        }

        let url = format!("{}{}", self.base_url, endpoint);
        let content_type = options.body.content_type();
        let body = options.body.encode()?;
        let caller_headers = parse_headers(&options.headers)?;

        let headers = self.build_headers(&caller_headers, content_type).await?;
        let response = self
            .send(&options.method, &url, headers, body.clone())
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!(status = status.as_u16(), "Authorization rejected, re-authenticating");
            self.auth.clear_tokens().await?;
            self.auth.authenticate_with_biometrics().await?;

            let headers = self.build_headers(&caller_headers, content_type).await?;
            debug!("Retrying request with new token");
            let retry = self.send(&options.method, &url, headers, body).await?;

            let retry_status = retry.status();
            if !retry_status.is_success() {
                let body = retry.text().await.unwrap_or_default();
                warn!(status = retry_status.as_u16(), "Retry after re-authentication failed");
                return Err(ClientError::RetryFailed {
                    status: retry_status.as_u16(),
                    body,
                });
            }
            return decode_success(retry).await;
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: error_message(status, &text),
            });
        }

        decode_success(response).await
    }

    /// API key, then auth, then caller headers, then content type
    async fn build_headers(
        &self,
        caller: &HeaderMap,
        content_type: Option<&'static str>,
    ) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, self.api_key.clone());
        let mut headers = self.auth.add_auth_header(headers).await?;

        for name in caller.keys() {
            headers.remove(name);
        }
        for (name, value) in caller {
            headers.append(name, value.clone());
        }

        if let Some(content_type) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        Ok(headers)
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        headers: HeaderMap,
        body: Option<String>,
    ) -> Result<Response> {
        debug!(
            headers = ?redacted(&headers),
            has_body = body.is_some(),
            "API Request: {method} {url}"
        );

        let mut request = self.http.request(method.clone(), url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        let response = request.send().await?;

        debug!("API Response: {} {url}", response.status());
        Ok(response)
    }
}

async fn decode_success(response: Response) -> Result<Value> {
    if response.status() == StatusCode::NO_CONTENT {
        return Ok(success_sentinel());
    }
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ClientError::MalformedResponse(e.to_string()))
}

/// `message` from a JSON error body, else the raw text, else a generic line
fn error_message(status: StatusCode, text: &str) -> String {
    let message = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => match map.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null | Value::Bool(false)) | None => String::new(),
            // 0 and -0 are falsy too
            Some(Value::Number(n)) if n.as_f64() == Some(0.0) => String::new(),
            Some(other) => other.to_string(),
        },
        Ok(_) => String::new(),
        Err(_) => text.to_string(),
    };
    if message.is_empty() {
        format!("API error: {}", status.as_u16())
    } else {
        message
    }
}

fn parse_headers(raw: &[(String, String)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for (name, value) in raw {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ClientError::InvalidHeader(name.clone()))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(name.clone()))?;
        headers.append(header_name, header_value);
    }
    Ok(headers)
}

/// Header summary safe to log
fn redacted(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if *name == AUTHORIZATION {
                let v = value.to_str().unwrap_or_default();
                format!("{}...", v.chars().take(20).collect::<String>())
            } else if *name == API_KEY_HEADER {
                "[HIDDEN]".to_string()
            } else {
                value.to_str().unwrap_or("<binary>").to_string()
            };
            (name.to_string(), shown)
        })
        .collect()
}

/// Builder for [`ApiClient`]
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    identity_url: Option<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    token_store: Option<TokenStore>,
    auth: Option<Arc<AuthService>>,
}

impl ApiClientBuilder {
    /// Set the base URL
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the identity endpoint used for the handshake
    #[must_use]
    pub fn identity_url(mut self, url: impl Into<String>) -> Self {
        self.identity_url = Some(url.into());
        self
    }

    /// Set the key sent as `X-API-KEY`
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the request timeout; none by default
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Storage for tokens; in-memory by default
    #[must_use]
    pub fn token_store(mut self, store: TokenStore) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Share an existing auth service instead of creating one
    #[must_use]
    pub fn auth_service(mut self, auth: Arc<AuthService>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let api_key = self
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ClientError::Configuration("api_key is required".into()))?;
        let mut api_key = HeaderValue::from_str(&api_key)
            .map_err(|_| ClientError::Configuration("api_key is not a valid header value".into()))?;
        api_key.set_sensitive(true);

        let mut client_builder = ClientBuilder::new().user_agent(
            self.user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        );
        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }
        let http = client_builder.build()?;

        let auth = match self.auth {
            Some(auth) => auth,
            None => {
                let identity_url = self.identity_url.unwrap_or_else(|| {
                    crate::config::DEFAULT_IDENTITY_URL.to_string()
                });
                let store = self.token_store.unwrap_or_else(TokenStore::in_memory);
                Arc::new(AuthService::new(http.clone(), identity_url, store))
            }
        };

        Ok(ApiClient {
            http,
            base_url,
            api_key,
            auth,
        })
    }
}
