//! Feedback client
//!
//! Collects customer feedback and submits it to the feedback backend.
//! Every backend call runs through [`ApiClient`], which obtains a bearer
//! token from the biometric identity endpoint on demand, attaches it, and
//! re-authenticates once when the backend answers 401 or 403.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod feedback;
pub mod form;
pub mod store;
pub mod types;

pub use api::{ApiClient, ApiClientBuilder};
pub use auth::AuthService;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use feedback::{FeedbackData, FeedbackService};
pub use form::{FeedbackForm, FeedbackStatus, FormState};
pub use store::{FileStore, KeyValueStore, MemoryStore, TokenStore};
pub use types::{AuthState, AuthTokens, RequestBody, RequestOptions};
