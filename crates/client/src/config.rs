//! Client configuration

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Production feedback backend
pub const DEFAULT_BASE_URL: &str =
    "https://azurewebapi-posproduction-epb5fkdahze7e3hr.centralindia-01.azurewebsites.net/api";

/// Identity endpoint that issues tokens after a biometric check
pub const DEFAULT_IDENTITY_URL: &str = "https://foodzoaiusermanagementmultiennenttesting-bmc3bbgbaeephqc4.eastus2-01.azurewebsites.net/api/User/JWTBiometric-success";

/// Endpoint feedback is posted to
pub const FEEDBACK_ENDPOINT: &str = "/feedback/submit";

/// Settings for [`ApiClient`](crate::ApiClient)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Identity endpoint for the biometric handshake
    #[serde(default = "default_identity_url")]
    pub identity_url: String,
    /// Value of the `X-API-KEY` header
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout; `None` waits indefinitely
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Where persisted tokens live; platform data dir when unset
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_identity_url() -> String {
    DEFAULT_IDENTITY_URL.to_string()
}

fn default_user_agent() -> String {
    concat!("feedback-client/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            identity_url: default_identity_url(),
            api_key: String::new(),
            user_agent: default_user_agent(),
            timeout_secs: None,
            state_dir: None,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(ClientError::Configuration("base_url must not be empty".into()));
        }
        if self.identity_url.trim().is_empty() {
            return Err(ClientError::Configuration(
                "identity_url must not be empty".into(),
            ));
        }
        if self.api_key.is_empty() {
            return Err(ClientError::Configuration(
                "api_key must be set (FEEDBACK_API_KEY)".into(),
            ));
        }
        Ok(())
    }
}
