//! Feedback form controller
//!
//! Holds the form fields and the submission status. State lives in a
//! `watch` channel so a UI can [`subscribe`](FeedbackForm::subscribe) to
//! changes while a submission is running.

use crate::api::ApiClient;
use crate::error::{ClientError, Result};
use crate::feedback::{FeedbackData, FeedbackService};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{error, warn};

const FALLBACK_ERROR: &str = "An error occurred while submitting feedback";
const CANCELLED_ERROR: &str = "Feedback submission was cancelled";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    #[default]
    Loaded,
    Submitting,
    Success,
    Error,
}

impl std::fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Loaded => "loaded",
            Self::Submitting => "submitting",
            Self::Success => "success",
            Self::Error => "error",
        })
    }
}

/// Everything the form shows at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub data: FeedbackData,
    pub status: FeedbackStatus,
    pub error_message: String,
}

pub struct FeedbackForm {
    api: ApiClient,
    state: watch::Sender<FormState>,
}

impl FeedbackForm {
    pub fn new(api: ApiClient, data: FeedbackData) -> Self {
        Self {
            api,
            state: watch::Sender::new(FormState {
                data,
                ..FormState::default()
            }),
        }
    }

    /// Form pre-filled from the page query string
    pub fn from_query(api: ApiClient, query: &str) -> Self {
        Self::new(api, FeedbackData::from_query(query))
    }

    pub fn subscribe(&self) -> watch::Receiver<FormState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> FormState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> FeedbackStatus {
        self.state.borrow().status
    }

    pub fn error_message(&self) -> String {
        self.state.borrow().error_message.clone()
    }

    pub fn data(&self) -> FeedbackData {
        self.state.borrow().data.clone()
    }

    pub fn set_field(&self, name: &str, value: &str) {
        self.state.send_modify(|s| s.data.set_field(name, value));
    }

    /// Submit the current fields.
    ///
    /// Only one submission may be in flight; a second call while one is
    /// running fails with [`ClientError::SubmissionInFlight`] and leaves
    /// the state untouched.
    pub async fn submit(&self) -> Result<Value> {
        let mut data = None;
        self.state.send_if_modified(|s| {
            if s.status == FeedbackStatus::Submitting {
                return false;
            }
            s.status = FeedbackStatus::Submitting;
            s.error_message.clear();
            data = Some(s.data.clone());
            true
        });
        let data = data.ok_or(ClientError::SubmissionInFlight)?;
        let submission = Submission {
            state: &self.state,
            settled: false,
        };

        match FeedbackService::submit(&self.api, &data).await {
            Ok(response) => {
                submission.settle(FeedbackStatus::Success, String::new());
                Ok(response)
            }
            Err(e) => {
                error!(error = %e, "Feedback submission error");
                let mut message = e.to_string();
                if message.is_empty() {
                    message = FALLBACK_ERROR.to_string();
                }
                submission.settle(FeedbackStatus::Error, message);
                Err(e)
            }
        }
    }

    /// Back to the editable form after an error ("Try Again")
    pub fn reset(&self) {
        self.state.send_modify(|s| {
            s.status = FeedbackStatus::Loaded;
            s.error_message.clear();
        });
    }
}

/// A running submission. Dropped unsettled (the `submit` future was
/// cancelled), it moves the form to `Error` so it can be submitted again.
struct Submission<'a> {
    state: &'a watch::Sender<FormState>,
    settled: bool,
}

impl Submission<'_> {
    fn settle(mut self, status: FeedbackStatus, message: String) {
        self.settled = true;
        self.state.send_modify(|s| {
            s.status = status;
            s.error_message = message;
        });
    }
}

impl Drop for Submission<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!("Feedback submission cancelled before completion");
        self.state.send_modify(|s| {
            s.status = FeedbackStatus::Error;
            s.error_message = CANCELLED_ERROR.to_string();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client() -> ApiClient {
        ApiClient::builder()
            .base_url("http://127.0.0.1:9")
            .identity_url("http://127.0.0.1:9/identity")
            .api_key("k")
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_form_is_loaded() {
        let form = FeedbackForm::from_query(offline_client(), "companyId=3&rating=4");
        assert_eq!(form.status(), FeedbackStatus::Loaded);
        assert_eq!(form.data().company_id, 3);
        assert!(form.error_message().is_empty());
    }

    #[test]
    fn test_set_field_is_observed_by_subscribers() {
        let form = FeedbackForm::new(offline_client(), FeedbackData::default());
        let mut rx = form.subscribe();
        form.set_field("customerName", "Grace");
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().data.customer_name, "Grace");
    }

    #[tokio::test]
    async fn test_second_submit_while_in_flight_is_rejected() {
        let form = FeedbackForm::new(offline_client(), FeedbackData::default());
        form.state
            .send_modify(|s| s.status = FeedbackStatus::Submitting);

        let result = form.submit().await;
        assert!(matches!(result, Err(ClientError::SubmissionInFlight)));
        assert_eq!(form.status(), FeedbackStatus::Submitting);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(FeedbackStatus::Submitting.to_string(), "submitting");
        assert_eq!(
            serde_json::to_value(FeedbackStatus::Error).unwrap(),
            serde_json::json!("error")
        );
    }

    #[test]
    fn test_unsettled_submission_moves_form_to_error() {
        let form = FeedbackForm::new(offline_client(), FeedbackData::default());
        form.state
            .send_modify(|s| s.status = FeedbackStatus::Submitting);

        drop(Submission {
            state: &form.state,
            settled: false,
        });
        assert_eq!(form.status(), FeedbackStatus::Error);
        assert_eq!(form.error_message(), CANCELLED_ERROR);
    }
}
