//! Shared data types for the API client

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tokens issued by the identity endpoint
///
/// `token` is always the raw credential; the `Bearer ` prefix is applied
/// when the header is built, never at storage time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub token: String,
    pub refresh_token: Option<String>,
    pub expires_at: String,
    pub refresh_token_expires_at: Option<String>,
}

/// Body returned by the identity endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub refresh_token_expires_at: Option<String>,
}

impl IdentityResponse {
    /// The first non-empty credential field, `accessToken` before `token`
    pub fn credential(&self) -> Option<&str> {
        [self.access_token.as_deref(), self.token.as_deref()]
            .into_iter()
            .flatten()
            .find(|t| !t.is_empty())
    }
}

/// Fixed payload that triggers the biometric handshake
#[derive(Debug, Serialize)]
pub struct HandshakeRequest {
    pub message: &'static str,
}

impl Default for HandshakeRequest {
    fn default() -> Self {
        Self { message: "success" }
    }
}

/// Authentication lifecycle as observed by the auth service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Expired,
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Request body, chosen explicitly by the caller
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    /// No body and no `Content-Type` header
    #[default]
    Empty,
    /// JSON-encoded, sent as `application/json`
    Json(Value),
    /// Sent verbatim as `text/plain`
    Raw(String),
}

impl RequestBody {
    /// Serialize any value into a JSON body
    pub fn json<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(Self::Json)
    }

    /// The content type this body is sent with
    pub const fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Empty => None,
            Self::Json(_) => Some("application/json"),
            Self::Raw(_) => Some("text/plain"),
        }
    }

    /// Encoded bytes to put on the wire
    pub fn encode(&self) -> serde_json::Result<Option<String>> {
        match self {
            Self::Empty => Ok(None),
            Self::Json(value) => serde_json::to_string(value).map(Some),
            Self::Raw(text) => Ok(Some(text.clone())),
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Raw(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Raw(text.to_string())
    }
}

/// Per-call request configuration
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: RequestBody,
    /// Caller headers; these win over pipeline-injected ones
    pub headers: Vec<(String, String)>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: RequestBody::Empty,
            headers: Vec::new(),
        }
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Value returned for `204 No Content`
pub fn success_sentinel() -> Value {
    serde_json::json!({ "success": true })
}
