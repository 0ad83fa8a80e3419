//! Feedback payload and submission

use crate::api::ApiClient;
use crate::config::FEEDBACK_ENDPOINT;
use crate::error::Result;
use crate::types::{RequestBody, RequestOptions};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

pub const COMPANY_ID_HEADER: &str = "X-Company-Id";

/// One feedback submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackData {
    pub company_id: i64,
    pub customer_name: String,
    /// 1-5, 0 when not chosen yet
    pub rating: i32,
    pub comments: String,
}

impl FeedbackData {
    /// Initial values from a page query string; missing fields default
    pub fn from_query(query: &str) -> Self {
        let mut data = Self::default();
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut seen = Vec::new();
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            // first occurrence wins
            if seen.contains(&name) {
                continue;
            }
            data.set_field(&name, &value);
            seen.push(name);
        }
        data
    }

    /// Initial values from a full page URL
    pub fn from_url(url: &str) -> std::result::Result<Self, url::ParseError> {
        let url = Url::parse(url)?;
        Ok(Self::from_query(url.query().unwrap_or_default()))
    }

    /// Apply one form edit by field name
    pub fn set_field(&mut self, name: &str, value: &str) {
        match name {
            "companyId" => self.company_id = parse_leading_int(value),
            "rating" => self.rating = saturating_i32(parse_leading_int(value)),
            "customerName" => self.customer_name = value.to_string(),
            "comments" => self.comments = value.to_string(),
            other => debug!(field = other, "Ignoring unknown feedback field"),
        }
    }
}

/// Leading-integer parse: optional whitespace and sign, then digits.
/// Trailing junk is ignored; no digits yields 0; out-of-range values
/// saturate.
fn parse_leading_int(raw: &str) -> i64 {
    let s = raw.trim_start();
    let (negative, sign_len) = match s.as_bytes().first() {
        Some(b'-') => (true, 1),
        Some(b'+') => (false, 1),
        _ => (false, 0),
    };
    let digits = s[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len() - sign_len);
    if digits == 0 {
        return 0;
    }

    match s[..sign_len + digits].parse::<i64>() {
        Ok(n) => n,
        Err(_) => {
            let saturated = if negative { i64::MIN } else { i64::MAX };
            debug!(value = raw, saturated, "Integer field out of range");
            saturated
        }
    }
}

fn saturating_i32(n: i64) -> i32 {
    i32::try_from(n).unwrap_or(if n < 0 { i32::MIN } else { i32::MAX })
}

/// Feedback submission against the backend
pub struct FeedbackService;

impl FeedbackService {
    pub async fn submit(api: &ApiClient, data: &FeedbackData) -> Result<Value> {
        let options = RequestOptions::new(Method::POST)
            .body(RequestBody::json(data)?)
            .header(COMPANY_ID_HEADER, data.company_id.to_string());

        let response = api.request(FEEDBACK_ENDPOINT, options).await?;
        info!(company_id = data.company_id, "Feedback submitted");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_query_reads_all_fields() {
        let data = FeedbackData::from_query(
            "?companyId=42&customerName=Ada%20Lovelace&rating=5&comments=Great+food",
        );
        assert_eq!(
            data,
            FeedbackData {
                company_id: 42,
                customer_name: "Ada Lovelace".into(),
                rating: 5,
                comments: "Great food".into(),
            }
        );
    }

    #[test]
    fn test_from_query_defaults_missing_fields() {
        assert_eq!(FeedbackData::from_query(""), FeedbackData::default());
        let data = FeedbackData::from_query("customerName=Bob");
        assert_eq!(data.company_id, 0);
        assert_eq!(data.rating, 0);
        assert_eq!(data.customer_name, "Bob");
    }

    #[test]
    fn test_from_query_first_value_wins() {
        let data = FeedbackData::from_query("rating=2&rating=4");
        assert_eq!(data.rating, 2);
    }

    #[test]
    fn test_from_url() {
        let data = FeedbackData::from_url("https://example.com/?companyId=7&rating=3").unwrap();
        assert_eq!(data.company_id, 7);
        assert_eq!(data.rating, 3);
        assert!(FeedbackData::from_url("not a url").is_err());
    }

    #[test]
    fn test_leading_int_parsing() {
        assert_eq!(parse_leading_int("12"), 12);
        assert_eq!(parse_leading_int("  12abc"), 12);
        assert_eq!(parse_leading_int("-3"), -3);
        assert_eq!(parse_leading_int("+8"), 8);
        assert_eq!(parse_leading_int("abc"), 0);
        assert_eq!(parse_leading_int(""), 0);
        assert_eq!(parse_leading_int("-"), 0);
    }

    #[test]
    fn test_out_of_range_ints_saturate() {
        assert_eq!(parse_leading_int("99999999999999999999"), i64::MAX);
        assert_eq!(parse_leading_int("-99999999999999999999x"), i64::MIN);
        assert_eq!(parse_leading_int("-9223372036854775808"), i64::MIN);

        let data = FeedbackData::from_query("companyId=99999999999999999999&rating=3000000000");
        assert_eq!(data.company_id, i64::MAX);
        assert_eq!(data.rating, i32::MAX);

        let mut data = FeedbackData::default();
        data.set_field("rating", "-3000000000");
        assert_eq!(data.rating, i32::MIN);
    }

    #[test]
    fn test_set_field() {
        let mut data = FeedbackData::default();
        data.set_field("rating", "4");
        data.set_field("comments", "  spaced  ");
        data.set_field("unknown", "x");
        assert_eq!(data.rating, 4);
        assert_eq!(data.comments, "  spaced  ");
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(FeedbackData {
            company_id: 1,
            customer_name: "A".into(),
            rating: 5,
            comments: "c".into(),
        })
        .unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "companyId": 1,
                "customerName": "A",
                "rating": 5,
                "comments": "c"
            })
        );
    }
}
