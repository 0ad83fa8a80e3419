//! CLI commands

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Args, Subcommand};
use feedback_client::{
    ApiClient, FeedbackData, FeedbackForm, RequestBody, RequestOptions,
};
use reqwest::Method;
use serde_json::Value;
use tracing::info;

#[derive(Subcommand)]
pub enum Commands {
    /// Submit feedback
    Submit(SubmitArgs),

    /// Run the biometric handshake and store the issued token
    Login,

    /// Forget the stored token
    Logout,

    /// Show whether a valid token is held
    Status,

    /// Send an arbitrary authenticated request to the backend
    Request(RequestArgs),
}

#[derive(Args)]
#[command(group(ArgGroup::new("source").args(["url", "query"])))]
pub struct SubmitArgs {
    /// Page URL whose query string pre-fills the form
    #[arg(long)]
    url: Option<String>,

    /// Query string that pre-fills the form (companyId=..&rating=..)
    #[arg(long)]
    query: Option<String>,

    #[arg(long)]
    company_id: Option<String>,

    #[arg(long)]
    customer_name: Option<String>,

    /// 1 (poor) to 5 (excellent)
    #[arg(long)]
    rating: Option<String>,

    #[arg(long)]
    comments: Option<String>,
}

#[derive(Args)]
#[command(group(ArgGroup::new("body").args(["json", "text"])))]
pub struct RequestArgs {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE)
    method: String,

    /// Endpoint path relative to the base URL, e.g. /feedback/submit
    endpoint: String,

    /// JSON body, sent as application/json
    #[arg(long)]
    json: Option<String>,

    /// Raw body, sent as text/plain
    #[arg(long)]
    text: Option<String>,

    /// Extra header as name:value; repeatable
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
}

impl Commands {
    pub async fn execute(self, api: ApiClient) -> Result<()> {
        match self {
            Self::Submit(args) => submit(api, args).await,
            Self::Login => login(&api).await,
            Self::Logout => {
                api.auth().clear_tokens().await?;
                println!("Logged out");
                Ok(())
            }
            Self::Status => {
                let state = api.auth().current_state().await?;
                println!("{state}");
                Ok(())
            }
            Self::Request(args) => raw_request(&api, args).await,
        }
    }
}

impl SubmitArgs {
    /// Initial fields from the URL or query, then flag edits on top
    fn into_data(self) -> Result<FeedbackData> {
        let mut data = match (&self.url, &self.query) {
            (Some(url), _) => FeedbackData::from_url(url).context("Invalid --url")?,
            (None, Some(query)) => FeedbackData::from_query(query),
            (None, None) => FeedbackData::default(),
        };

        let edits = [
            ("companyId", self.company_id),
            ("customerName", self.customer_name),
            ("rating", self.rating),
            ("comments", self.comments),
        ];
        for (field, value) in edits {
            if let Some(value) = value {
                data.set_field(field, &value);
            }
        }
        Ok(data)
    }
}

async fn submit(api: ApiClient, args: SubmitArgs) -> Result<()> {
    let data = args.into_data()?;
    info!(company_id = data.company_id, rating = data.rating, "Submitting feedback");

    let form = FeedbackForm::new(api, data);
    println!("Submitting your feedback...");

    if form.submit().await.is_err() {
        bail!("{}", form.error_message());
    }
    println!("Thank You! Your feedback has been successfully submitted.");
    Ok(())
}

async fn login(api: &ApiClient) -> Result<()> {
    let tokens = api.auth().authenticate_with_biometrics().await?;
    println!("Authenticated; token expires at {}", tokens.expires_at);
    Ok(())
}

async fn raw_request(api: &ApiClient, args: RequestArgs) -> Result<()> {
    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", args.method))?;

    let body = match (args.json, args.text) {
        (Some(json), _) => {
            let value: Value = serde_json::from_str(&json).context("--json is not valid JSON")?;
            RequestBody::Json(value)
        }
        (None, Some(text)) => RequestBody::Raw(text),
        (None, None) => RequestBody::Empty,
    };

    let mut options = RequestOptions::new(method).body(body);
    for header in args.headers {
        let (name, value) = parse_header(&header)?;
        options = options.header(name, value);
    }

    let response = api.request(&args.endpoint, options).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("Header must be name:value, got {raw:?}");
    };
    Ok((name.trim().to_string(), value.trim().to_string()))
}
