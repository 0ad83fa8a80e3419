//! Authentication service
//!
//! Owns the biometric handshake against the identity endpoint and the
//! token lifecycle on top of [`TokenStore`].

use crate::error::{ClientError, Result};
use crate::store::TokenStore;
use crate::types::{AuthState, AuthTokens, HandshakeRequest, IdentityResponse};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, instrument, warn};

pub const BEARER_PREFIX: &str = "Bearer ";

/// Authentication handshake and token lifecycle
#[derive(Debug)]
pub struct AuthService {
    http: reqwest::Client,
    identity_url: String,
    store: TokenStore,
    handshakes_in_flight: AtomicUsize,
}

impl AuthService {
    pub fn new(http: reqwest::Client, identity_url: impl Into<String>, store: TokenStore) -> Self {
        Self {
            http,
            identity_url: identity_url.into(),
            store,
            handshakes_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn identity_url(&self) -> &str {
        &self.identity_url
    }

    /// Whether a non-expired token is held.
    ///
    /// Not a pure query: an expired token is cleared from storage before
    /// this returns `false`.
    pub async fn is_authenticated(&self) -> Result<bool> {
        if self.store.read().await?.is_none() {
            return Ok(false);
        }

        let expiry = self.store.read_expiry().await?;
        if expiry.as_deref().is_some_and(|e| is_expired(e, Utc::now())) {
            info!("Stored token has expired, clearing");
            self.clear_tokens().await?;
            return Ok(false);
        }

        Ok(true)
    }

    /// Current lifecycle state, without touching storage
    pub async fn current_state(&self) -> Result<AuthState> {
        if self.handshakes_in_flight.load(Ordering::Acquire) > 0 {
            return Ok(AuthState::Authenticating);
        }
        if self.store.read().await?.is_none() {
            return Ok(AuthState::Unauthenticated);
        }
        let expiry = self.store.read_expiry().await?;
        if expiry.as_deref().is_some_and(|e| is_expired(e, Utc::now())) {
            Ok(AuthState::Expired)
        } else {
            Ok(AuthState::Authenticated)
        }
    }

    /// Run the handshake and persist the tokens it yields
    #[instrument(name = "biometric_handshake", skip(self), fields(url = %self.identity_url))]
    pub async fn authenticate_with_biometrics(&self) -> Result<AuthTokens> {
        let tokens = {
            let _in_flight = InFlight::enter(&self.handshakes_in_flight);
            self.handshake().await?
        };
        self.store_tokens(&tokens).await?;
        info!(expires_at = %tokens.expires_at, "Biometric authentication succeeded");
        Ok(tokens)
    }

    async fn handshake(&self) -> Result<AuthTokens> {
        let response = self
            .http
            .post(&self.identity_url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&HandshakeRequest::default())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Identity endpoint rejected handshake");
            return Err(ClientError::AuthenticationFailed {
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        let body: IdentityResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::MalformedResponse(format!("identity response: {e}")))?;

        let token = body.credential().ok_or(ClientError::MissingToken)?.to_string();
        let expires_at = body.expires_at.ok_or(ClientError::MissingExpiry)?;

        Ok(AuthTokens {
            token,
            refresh_token: body.refresh_token,
            expires_at,
            refresh_token_expires_at: body.refresh_token_expires_at,
        })
    }

    pub async fn store_tokens(&self, tokens: &AuthTokens) -> Result<()> {
        self.store.write(tokens).await
    }

    pub async fn get_auth_token(&self) -> Result<Option<String>> {
        self.store.read().await
    }

    pub async fn clear_tokens(&self) -> Result<()> {
        self.store.clear().await
    }

    /// Copy of `headers` with `Authorization` set when a token is held.
    ///
    /// A missing token leaves the headers untouched; the caller decides
    /// whether that is fatal.
    pub async fn add_auth_header(&self, headers: HeaderMap) -> Result<HeaderMap> {
        let Some(token) = self.get_auth_token().await? else {
            debug!("No auth token held, Authorization header not added");
            return Ok(headers);
        };
        with_bearer(headers, &token)
    }
}

/// Counts a running handshake until dropped, including when the
/// handshake future is cancelled mid-flight.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Insert `Authorization: Bearer <token>` without double-prefixing
pub fn with_bearer(mut headers: HeaderMap, token: &str) -> Result<HeaderMap> {
    let value = bearer_value(token);
    let value = HeaderValue::from_str(&value)
        .map_err(|_| ClientError::InvalidHeader("Authorization".into()))?;
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

pub fn bearer_value(token: &str) -> String {
    if token.starts_with(BEARER_PREFIX) {
        token.to_string()
    } else {
        format!("{BEARER_PREFIX}{token}")
    }
}

/// Parse an expiry timestamp.
///
/// Accepts RFC 3339, and ISO 8601 without an offset (taken as UTC).
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Whether `now` is past the expiry; unparsable expiries never expire
pub fn is_expired(raw: &str, now: DateTime<Utc>) -> bool {
    match parse_expiry(raw) {
        Some(expires_at) => now > expires_at,
        None => {
            warn!(expiry = raw, "Unparsable token expiry, treating token as valid");
            false
        }
    }
}
