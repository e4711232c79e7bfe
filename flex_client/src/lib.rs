//! Client for the Flex Web Service: ask for a statement, then poll until it is generated.

mod response;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

pub use response::FlexResponse;

pub const DEFAULT_BASE_URL: &str = "https://gdcdyn.interactivebrokers.com/Universal/servlet/";
pub const DEFAULT_VERSION: &str = "3";

const SEND_REQUEST: &str = "FlexStatementService.SendRequest";
const GET_STATEMENT: &str = "FlexStatementService.GetStatement";
const STATEMENT_MARKER: &str = "<FlexStatement";
// The pending envelope's root tag shares the marker prefix.
const ENVELOPE_SUFFIX: &str = "Response";

#[derive(Debug, Clone)]
pub struct FlexSettings {
    pub base_url: String,
    pub version: String,
    pub max_wait: Duration,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for FlexSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            version: DEFAULT_VERSION.to_string(),
            max_wait: Duration::from_secs(120),
            poll_interval: Duration::from_secs(3),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Error)]
pub enum FlexError {
    #[error("flex http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Flex SendRequest failed: {message}")]
    Rejected {
        code: Option<String>,
        message: String,
    },
    #[error("No ReferenceCode returned.")]
    MissingReferenceCode,
    #[error("Flex statement not ready after waiting.")]
    NotReady { waited: Duration, attempts: u32 },
    #[error("malformed flex response: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed flex response: document ends with {open} unclosed element(s)")]
    Truncated { open: usize },
    #[error("malformed flex response: no root element")]
    NoRoot,
}

pub type FlexResult<T> = Result<T, FlexError>;

/// Anything that can hand back a raw, generated statement document.
#[async_trait]
pub trait StatementSource: Send + Sync {
    async fn fetch_statement(&self) -> FlexResult<String>;
}

#[derive(Clone)]
pub struct FlexClient {
    client: Client,
    settings: FlexSettings,
    token: String,
    query_id: String,
}

impl FlexClient {
    pub fn new(
        token: impl Into<String>,
        query_id: impl Into<String>,
        mut settings: FlexSettings,
    ) -> FlexResult<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(concat!("portfolio-updater/", env!("CARGO_PKG_VERSION")))
            .build()?;
        settings.base_url = format!("{}/", settings.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            settings,
            token: token.into(),
            query_id: query_id.into(),
        })
    }

    pub fn settings(&self) -> &FlexSettings {
        &self.settings
    }

    /// Starts statement generation and returns the reference code to poll with.
    pub async fn send_request(&self) -> FlexResult<String> {
        let body = self.get(SEND_REQUEST, &self.query_id).await?;
        let reference_code = reference_code_from(&body)?;
        info!(%reference_code, "flex statement requested");
        Ok(reference_code)
    }

    /// Polls at a fixed interval until the statement is generated or `max_wait` has passed.
    ///
    /// The deadline is checked after each response, so the last request may land slightly past
    /// `max_wait` but the error is never raised before it.
    pub async fn get_statement(&self, reference_code: &str) -> FlexResult<String> {
        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let body = self.get(GET_STATEMENT, reference_code).await?;
            let body = body.trim();
            if contains_statement(body) {
                info!(attempts, bytes = body.len(), "flex statement ready");
                return Ok(body.to_string());
            }
            log_pending(body, attempts);

            // 每次回應後才檢查期限，不會提早放棄
            let waited = started.elapsed();
            if waited > self.settings.max_wait {
                return Err(FlexError::NotReady { waited, attempts });
            }
            sleep(self.settings.poll_interval).await;
        }
    }

    async fn get(&self, endpoint: &str, code: &str) -> FlexResult<String> {
        let url = format!("{}{}", self.settings.base_url, endpoint);
        let body = self
            .client
            .get(url)
            .query(&[
                ("t", self.token.as_str()),
                ("q", code),
                ("v", self.settings.version.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

#[async_trait]
impl StatementSource for FlexClient {
    async fn fetch_statement(&self) -> FlexResult<String> {
        let reference_code = self.send_request().await?;
        self.get_statement(&reference_code).await
    }
}

/// Extracts the reference code from a `SendRequest` body.
pub fn reference_code_from(body: &str) -> FlexResult<String> {
    let response = FlexResponse::parse(body)?;
    if !response.is_success() {
        let message = response
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string());
        return Err(FlexError::Rejected {
            code: response.code().map(str::to_string),
            message,
        });
    }

    response
        .reference_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .ok_or(FlexError::MissingReferenceCode)
}

/// True when the body holds a generated statement rather than the pending envelope.
pub fn contains_statement(body: &str) -> bool {
    body.match_indices(STATEMENT_MARKER)
        .any(|(idx, marker)| !body[idx + marker.len()..].starts_with(ENVELOPE_SUFFIX))
}

fn log_pending(body: &str, attempts: u32) {
    match FlexResponse::parse(body) {
        Ok(response) => info!(
            attempts,
            status = response.status.as_deref().map(str::trim).unwrap_or(""),
            code = response.code().unwrap_or(""),
            message = response.message().unwrap_or(""),
            "flex statement not ready"
        ),
        Err(err) => debug!(attempts, %err, "flex statement not ready; unparsed body"),
    }
}
